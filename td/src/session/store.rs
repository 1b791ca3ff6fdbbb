//! Per-session durable state: `events.ndjson` (system of
//! record, append-only) plus a `turns.json` snapshot rebuilt from the
//! `TurnAssembler` after every event. Writes for one session are
//! serialized through a single async mutex so concurrent agents sharing a
//! session never interleave lines or lose the `sessionSeq` ordering.
//!
//! Layout: `<sessions_dir>/<session_id>/{events.ndjson,turns.json}`.

use std::path::PathBuf;

use async_trait::async_trait;
use eyre::{Context, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::assembler::{rebuild_from_events, TurnAssembler};
use super::bus::EventSink;
use super::event::Event;
use super::turn::Turn;

struct SessionState {
    next_session_seq: u64,
    next_turn_sequence: u64,
    assembler: TurnAssembler,
    /// User turns, kept separately: they have no event representation, so
    /// `TurnAssembler` cannot recover them from the event log alone.
    user_turns: Vec<Turn>,
    initialized: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            next_session_seq: 0,
            next_turn_sequence: 0,
            assembler: TurnAssembler::new(),
            user_turns: Vec::new(),
            initialized: false,
        }
    }
}

fn merge_turns(assembler_turns: Vec<Turn>, user_turns: &[Turn]) -> Vec<Turn> {
    let mut all = assembler_turns;
    all.extend(user_turns.iter().cloned());
    all.sort_by_key(|t| t.sequence);
    all
}

pub struct SessionStore {
    sessions_dir: PathBuf,
    session_id: String,
    run_id: String,
    state: Mutex<SessionState>,
}

impl SessionStore {
    pub fn new(sessions_dir: impl Into<PathBuf>, session_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            session_id: session_id.into(),
            run_id: run_id.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn session_dir(&self) -> PathBuf {
        self.sessions_dir.join(&self.session_id)
    }

    fn events_file(&self) -> PathBuf {
        self.session_dir().join("events.ndjson")
    }

    fn turns_file(&self) -> PathBuf {
        self.session_dir().join("turns.json")
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(self.session_dir()).await.context("creating session directory")?;
        Ok(())
    }

    async fn read_existing_events(&self) -> Result<Vec<Event>> {
        let path = self.events_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).await.context("reading session event log")?;
        let events = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Event>(line) {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(%err, "SessionStore: skipping unparsable event log line");
                    None
                }
            })
            .collect();
        Ok(events)
    }

    async fn read_turns_snapshot(&self) -> Result<Option<Vec<Turn>>> {
        let path = self.turns_file();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await.context("reading turns snapshot")?;
        Ok(Some(serde_json::from_str(&content).context("parsing turns snapshot")?))
    }

    /// Load prior state on first use: resume `sessionSeq` from the highest
    /// value seen for this `runId`, and rebuild the live assembler by
    /// replaying every event on disk (`turns.json` is only a cache of this
    /// replay; its absence just means the first call pays the replay cost).
    async fn ensure_initialized(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.initialized {
            return Ok(());
        }

        let events = self.read_existing_events().await?;
        let max_seq_for_run = events
            .iter()
            .filter(|e| e.run_id.as_deref() == Some(self.run_id.as_str()))
            .filter_map(|e| e.session_seq)
            .max();
        state.next_session_seq = max_seq_for_run.map(|m| m + 1).unwrap_or(0);

        let replayed = rebuild_from_events(&events);
        let existing_user_turns: Vec<Turn> = self
            .read_turns_snapshot()
            .await?
            .map(|turns| turns.into_iter().filter(|t| t.turn_type == super::turn::TurnType::User).collect())
            .unwrap_or_default();
        let max_sequence = replayed
            .iter()
            .chain(existing_user_turns.iter())
            .map(|t| t.sequence)
            .max();
        state.next_turn_sequence = max_sequence.map(|m| m + 1).unwrap_or(0);
        state.user_turns = existing_user_turns;

        let SessionState { next_turn_sequence, assembler, .. } = &mut *state;
        for event in &events {
            assembler.apply(event, || {
                *next_turn_sequence += 1;
                *next_turn_sequence - 1
            });
        }

        state.initialized = true;
        debug!(session_id = %self.session_id, events = events.len(), "SessionStore: initialized from disk");
        Ok(())
    }

    /// Append one event, assigning it this session's next `sessionSeq`
    /// (scoped to its `runId`), persist it, fold it into the live turn
    /// projection, and rewrite the `turns.json` snapshot.
    pub async fn append_event(&self, mut event: Event) -> Result<Event> {
        self.ensure_initialized().await?;
        self.ensure_dir().await?;

        let mut state = self.state.lock().await;
        if event.run_id.is_none() {
            event.run_id = Some(self.run_id.clone());
        }
        event.session_seq = Some(state.next_session_seq);
        state.next_session_seq += 1;

        let line = serde_json::to_string(&event)? + "\n";
        let mut file = fs::OpenOptions::new().create(true).append(true).open(self.events_file()).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        let SessionState { next_turn_sequence, assembler, user_turns, .. } = &mut *state;
        assembler.apply(&event, || {
            *next_turn_sequence += 1;
            *next_turn_sequence - 1
        });
        let snapshot = merge_turns(assembler.snapshot(), user_turns);
        drop(state);

        self.write_turns_snapshot(&snapshot).await?;
        Ok(event)
    }

    async fn write_turns_snapshot(&self, turns: &[Turn]) -> Result<()> {
        let json = serde_json::to_string_pretty(turns)?;
        fs::write(self.turns_file(), json).await.context("writing turns snapshot")?;
        Ok(())
    }

    /// Record a user-submitted turn directly — user turns have no
    /// corresponding event type and so are never produced by the
    /// assembler's event replay.
    pub async fn record_user_turn(&self, agent_id: &str, text: &str) -> Result<Turn> {
        self.ensure_initialized().await?;
        self.ensure_dir().await?;

        let mut state = self.state.lock().await;
        let sequence = state.next_turn_sequence;
        state.next_turn_sequence += 1;
        let turn = Turn::new_user(agent_id, sequence, taskstore::now_ms(), text);
        state.user_turns.push(turn.clone());

        let snapshot = merge_turns(state.assembler.snapshot(), &state.user_turns);
        drop(state);

        self.write_turns_snapshot(&snapshot).await?;
        Ok(turn)
    }

    /// Current turn projection. Always derived from the live, in-memory
    /// assembler plus recorded user turns — `turns.json` is a write-through
    /// cache other readers (a TUI, a CLI inspector) can poll directly.
    pub async fn turns(&self) -> Result<Vec<Turn>> {
        self.ensure_initialized().await?;
        let state = self.state.lock().await;
        Ok(merge_turns(state.assembler.snapshot(), &state.user_turns))
    }
}

/// Wires a `SessionStore` directly onto an `EventBus`: every emitted event
/// is durably appended. Persistence failures are logged, not propagated —
/// an event sink must never fail the run it is observing.
#[async_trait]
impl EventSink for SessionStore {
    async fn on_event(&self, event: &Event) {
        if let Err(err) = self.append_event(event.clone()).await {
            warn!(session_id = %self.session_id, %err, "SessionStore: failed to persist event");
        }
    }
}
