use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::nodes::NodeKind;
use crate::vm::DEFAULT_MAX_STEPS;

/// Expansion and VM settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Upper bound on expansion passes over the graph
    pub max_expansion_passes: usize,

    /// Upper bound on nodes entered per VM run
    pub vm_max_steps: usize,

    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,

    pub theme: EditorTheme,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_expansion_passes: 16,
            vm_max_steps: DEFAULT_MAX_STEPS,
            log_level: "info".to_string(),
            theme: EditorTheme::default(),
        }
    }
}

/// Icon names shown on node headers, injected by the host editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorTheme {
    pub event_icon: String,
    pub function_icon: String,
    pub pure_function_icon: String,
    pub variable_icon: String,
    pub flow_icon: String,
    pub loop_icon: String,
    pub delegate_icon: String,
}

impl Default for EditorTheme {
    fn default() -> Self {
        Self {
            event_icon: "event".to_string(),
            function_icon: "function".to_string(),
            pure_function_icon: "function-pure".to_string(),
            variable_icon: "variable".to_string(),
            flow_icon: "branch".to_string(),
            loop_icon: "loop".to_string(),
            delegate_icon: "delegate".to_string(),
        }
    }
}

impl EditorTheme {
    pub fn icon_for(&self, kind: &NodeKind) -> &str {
        match kind {
            NodeKind::Event(_) | NodeKind::CustomEvent(_) => &self.event_icon,
            NodeKind::CallFunction(call) if call.signature.is_pure => &self.pure_function_icon,
            NodeKind::CallFunction(_) => &self.function_icon,
            NodeKind::TemporaryVariable(_) | NodeKind::Assignment => &self.variable_icon,
            NodeKind::IfThenElse | NodeKind::ExecutionSequence { .. } => &self.flow_icon,
            NodeKind::ForEach(_) | NodeKind::MapForEach(_) => &self.loop_icon,
            NodeKind::AddDelegate(_) | NodeKind::BindEvents(_) => &self.delegate_icon,
        }
    }
}

impl ExpansionConfig {
    /// Load from a JSON or TOML file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .or_else(|_| toml::from_str(&text))
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Apply `BLUEPRINT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(passes) = lookup("BLUEPRINT_MAX_EXPANSION_PASSES") {
            self.max_expansion_passes = passes
                .trim()
                .parse()
                .context("BLUEPRINT_MAX_EXPANSION_PASSES must be a positive integer")?;
        }
        if let Some(steps) = lookup("BLUEPRINT_VM_MAX_STEPS") {
            self.vm_max_steps = steps
                .trim()
                .parse()
                .context("BLUEPRINT_VM_MAX_STEPS must be a positive integer")?;
        }
        if let Some(level) = lookup("BLUEPRINT_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Defaults, then the optional file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::nodes::{EventNode, ForEachLoop};

    #[test]
    fn test_defaults() {
        let config = ExpansionConfig::default();
        assert_eq!(config.max_expansion_passes, 16);
        assert_eq!(config.vm_max_steps, 100_000);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "max_expansion_passes = 4\n\n[theme]\nloop_icon = \"repeat\"").unwrap();

        let config = ExpansionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_expansion_passes, 4);
        assert_eq!(config.vm_max_steps, 100_000);
        assert_eq!(config.theme.loop_icon, "repeat");
        assert_eq!(config.theme.event_icon, "event");
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"vm_max_steps": 12, "log_level": "debug"}}"#).unwrap();

        let config = ExpansionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.vm_max_steps, 12);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "max_expansion_passes = [").unwrap();

        let err = ExpansionConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
        assert!(ExpansionConfig::from_file(Path::new("/definitely/not/here.toml")).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = ExpansionConfig::default();
        config
            .apply_overrides(|key| match key {
                "BLUEPRINT_VM_MAX_STEPS" => Some("500".to_string()),
                "BLUEPRINT_LOG_LEVEL" => Some("trace".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.vm_max_steps, 500);
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.max_expansion_passes, 16);

        let bad = config.apply_overrides(|key| (key == "BLUEPRINT_MAX_EXPANSION_PASSES").then(|| "many".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn test_theme_icons() {
        let theme = EditorTheme::default();
        assert_eq!(theme.icon_for(&NodeKind::ForEach(ForEachLoop::default())), "loop");
        assert_eq!(theme.icon_for(&NodeKind::Event(EventNode::new("BeginPlay"))), "event");
        assert_eq!(theme.icon_for(&NodeKind::IfThenElse), "branch");
    }
}
