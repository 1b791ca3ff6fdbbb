//! Mode registry: binds a named mode to an alternate execution strategy —
//! a small set of overrides layered onto the caller's base `AgentConfig`
//! and system prompt, rather than a dynamically imported handler. Modes
//! register once, at construction time; there is no lazy or runtime
//! registration path (see REDESIGN FLAGS: dynamic mode registration via
//! lazy imports is replaced with a static map built at startup).

use std::collections::HashMap;

use crate::agent::AgentConfig;

/// One execution strategy: a human-readable purpose plus the config
/// overrides it applies on top of the caller's base `AgentConfig`.
#[derive(Debug, Clone)]
pub struct Mode {
    pub name: &'static str,
    pub description: &'static str,
    pub system_prompt_suffix: &'static str,
    /// `None` leaves the caller's tool set untouched.
    pub tool_names: Option<Vec<String>>,
}

impl Mode {
    /// Apply this mode's overrides onto `base`, returning the adjusted
    /// config. Only fields the mode actually overrides change.
    pub fn apply(&self, mut base: AgentConfig) -> AgentConfig {
        if let Some(tool_names) = &self.tool_names {
            base.tool_names = tool_names.clone();
        }
        base
    }
}

fn built_in_modes() -> Vec<Mode> {
    vec![
        Mode {
            name: "execute",
            description: "Default: read, write, and run tools freely to finish the task.",
            system_prompt_suffix: "",
            tool_names: None,
        },
        Mode {
            name: "plan",
            description: "Investigate and propose an approach without making file changes.",
            system_prompt_suffix: "\n\nDo not modify any files. Describe the plan you would execute instead of executing it.",
            tool_names: Some(vec![
                "read".to_string(),
                "list".to_string(),
                "glob".to_string(),
                "grep".to_string(),
                "tree".to_string(),
                "search".to_string(),
                "complete_task".to_string(),
            ]),
        },
        Mode {
            name: "spec",
            description: "Produce a specification document rather than an implementation.",
            system_prompt_suffix: "\n\nProduce a specification of the requested change; do not implement it.",
            tool_names: Some(vec![
                "read".to_string(),
                "write".to_string(),
                "list".to_string(),
                "glob".to_string(),
                "grep".to_string(),
                "complete_task".to_string(),
            ]),
        },
        Mode {
            name: "debug",
            description: "Reproduce and diagnose a failure before proposing a fix.",
            system_prompt_suffix: "\n\nFocus on reproducing and diagnosing the failure; do not fix it unless the root cause is confirmed.",
            tool_names: None,
        },
        Mode {
            name: "edit",
            description: "Apply a narrowly scoped edit without broader exploration.",
            system_prompt_suffix: "\n\nMake the minimal edit needed; avoid broad exploration beyond what the task requires.",
            tool_names: Some(vec!["read".to_string(), "edit".to_string(), "write".to_string(), "complete_task".to_string()]),
        },
    ]
}

/// A `{name -> Mode}` map, built once at construction from the built-in
/// set. Custom modes may be added via `register` before the registry is
/// handed off to callers.
#[derive(Debug, Clone, Default)]
pub struct ModeRegistry {
    modes: HashMap<String, Mode>,
}

impl ModeRegistry {
    pub fn new() -> Self {
        let mut modes = HashMap::new();
        for mode in built_in_modes() {
            modes.insert(mode.name.to_string(), mode);
        }
        Self { modes }
    }

    pub fn register(&mut self, mode: Mode) {
        self.modes.insert(mode.name.to_string(), mode);
    }

    pub fn get(&self, name: &str) -> Option<&Mode> {
        self.modes.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_includes_all_five_built_in_modes() {
        let registry = ModeRegistry::new();
        assert_eq!(registry.names(), vec!["debug", "edit", "execute", "plan", "spec"]);
    }

    #[test]
    fn plan_mode_restricts_tools_and_forbids_edits() {
        let registry = ModeRegistry::new();
        let plan = registry.get("plan").unwrap();
        let config = plan.apply(AgentConfig::default());
        assert!(!config.tool_names.contains(&"write".to_string()));
        assert!(!config.tool_names.contains(&"edit".to_string()));
    }

    #[test]
    fn unknown_mode_name_is_not_registered() {
        let registry = ModeRegistry::new();
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn custom_modes_can_be_registered_at_startup() {
        let mut registry = ModeRegistry::new();
        registry.register(Mode {
            name: "review",
            description: "Read-only code review.",
            system_prompt_suffix: "",
            tool_names: Some(vec!["read".to_string(), "complete_task".to_string()]),
        });
        assert!(registry.get("review").is_some());
    }
}
