//! Demo surface definitions.
//!
//! A `DemoConfig` is static: built in, or loaded from a JSON file once at start-up and validated
//! before anything uses it.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_RUN_HISTORY_LIMIT: usize = 10;

const DEMOS_FILE_NAME: &str = "demos.json";

/// Result views a demo surface may enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultView {
    Table,
    Markdown,
    SlaBreach,
}

impl ResultView {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultView::Table => "table",
            ResultView::Markdown => "markdown",
            ResultView::SlaBreach => "sla-breach",
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_run_history_limit() -> usize {
    DEFAULT_RUN_HISTORY_LIMIT
}

fn default_result_views() -> BTreeSet<ResultView> {
    BTreeSet::from([ResultView::Table, ResultView::Markdown])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DemoConfig {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub default_prompt: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_run_history_limit")]
    pub run_history_limit: usize,
    /// Optional safety bound on poll fetches per run. `None` polls until a terminal status.
    #[serde(default)]
    pub max_poll_attempts: Option<u32>,
    /// Checked in order; the first field with a non-empty value wins per row.
    #[serde(default)]
    pub ticket_id_fields: Vec<String>,
    #[serde(default = "default_result_views")]
    pub result_views: BTreeSet<ResultView>,
    #[serde(default)]
    pub ticket_display_fields: Vec<String>,
}

impl DemoConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shows(&self, view: ResultView) -> bool {
        self.result_views.contains(&view)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            demo: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("pollIntervalMs must be greater than zero".into()));
        }
        if self.run_history_limit == 0 {
            return Err(invalid("runHistoryLimit must be at least 1".into()));
        }
        if self.max_poll_attempts == Some(0) {
            return Err(invalid("maxPollAttempts must be at least 1 when set".into()));
        }
        if self.result_views.is_empty() {
            return Err(invalid("at least one result view must be enabled".into()));
        }
        check_field_list("ticketIdFields", &self.ticket_id_fields).map_err(invalid)?;
        check_field_list("ticketDisplayFields", &self.ticket_display_fields).map_err(invalid)?;
        Ok(())
    }
}

fn check_field_list(label: &str, fields: &[String]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for f in fields {
        if f.trim().is_empty() {
            return Err(format!("{label} contains a blank field name"));
        }
        if !seen.insert(f.as_str()) {
            return Err(format!("{label} lists {f:?} more than once"));
        }
    }
    Ok(())
}

/// The validated set of demo surfaces available to this process.
#[derive(Debug, Clone)]
pub struct DemoRegistry {
    demos: Vec<DemoConfig>,
}

impl DemoRegistry {
    pub fn new(demos: Vec<DemoConfig>) -> Result<Self, ConfigError> {
        let mut ids = HashSet::new();
        for demo in &demos {
            demo.validate()?;
            if !ids.insert(demo.id.clone()) {
                return Err(ConfigError::DuplicateDemo(demo.id.clone()));
            }
        }
        Ok(Self { demos })
    }

    pub fn builtin() -> Self {
        Self {
            demos: builtin_demos(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let demos: Vec<DemoConfig> =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(demos)
    }

    /// Load from `explicit` if given, else from the user config dir if a file exists there,
    /// else fall back to the built-in definitions.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_demos_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading demo definitions");
                Self::from_file(&path)
            }
            _ => Ok(Self::builtin()),
        }
    }

    pub fn get(&self, id: &str) -> Result<&DemoConfig, ConfigError> {
        self.demos
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| ConfigError::UnknownDemo(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DemoConfig> {
        self.demos.iter()
    }
}

fn default_demos_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("usecase-demo-runs").join(DEMOS_FILE_NAME))
}

fn default_ticket_id_fields() -> Vec<String> {
    vec!["ticket_ids".into(), "ticket_id".into(), "ticketIds".into()]
}

fn builtin_demos() -> Vec<DemoConfig> {
    vec![
        DemoConfig {
            id: "usecase-demo".into(),
            title: "Use-case explorer".into(),
            default_prompt: "Which projects in the backlog address ticket routing? \
                List menu point, project name and the related ticket ids."
                .into(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            run_history_limit: DEFAULT_RUN_HISTORY_LIMIT,
            max_poll_attempts: None,
            ticket_id_fields: default_ticket_id_fields(),
            result_views: BTreeSet::from([ResultView::Table, ResultView::Markdown]),
            ticket_display_fields: vec![
                "summary".into(),
                "status".into(),
                "priority".into(),
                "assigned_group".into(),
            ],
        },
        DemoConfig {
            id: "sla-breach".into(),
            title: "SLA breach analysis".into(),
            default_prompt: "Find tickets that breached their SLA in the last 30 days \
                and explain the most likely causes."
                .into(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            run_history_limit: 5,
            max_poll_attempts: None,
            ticket_id_fields: default_ticket_id_fields(),
            result_views: BTreeSet::from([ResultView::Markdown, ResultView::SlaBreach]),
            ticket_display_fields: vec![
                "summary".into(),
                "priority".into(),
                "sla_due".into(),
                "status".into(),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_demos_are_valid() {
        let reg = DemoRegistry::builtin();
        DemoRegistry::new(reg.iter().cloned().collect()).unwrap();
        assert!(reg.get("usecase-demo").is_ok());
        assert!(matches!(
            reg.get("nope"),
            Err(ConfigError::UnknownDemo(_))
        ));
    }

    #[test]
    fn camel_case_definition_with_defaults() {
        let cfg: DemoConfig = serde_json::from_str(
            r#"{"id":"x","ticketIdFields":["ticket_ids"],"resultViews":["sla-breach"]}"#,
        )
        .unwrap();
        assert_eq!(cfg.poll_interval(), Duration::from_millis(2000));
        assert_eq!(cfg.run_history_limit, DEFAULT_RUN_HISTORY_LIMIT);
        assert!(cfg.shows(ResultView::SlaBreach));
        assert!(!cfg.shows(ResultView::Table));
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_result_view_is_rejected_at_parse() {
        let res: Result<DemoConfig, _> =
            serde_json::from_str(r#"{"id":"x","resultViews":["pie-chart"]}"#);
        assert!(res.is_err());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let base = DemoRegistry::builtin().get("usecase-demo").unwrap().clone();

        let mut c = base.clone();
        c.poll_interval_ms = 0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.run_history_limit = 0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.ticket_id_fields.push("ticket_ids".into());
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.ticket_display_fields.push("  ".into());
        assert!(c.validate().is_err());

        let mut c = base;
        c.result_views.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let d = DemoRegistry::builtin().get("sla-breach").unwrap().clone();
        assert!(matches!(
            DemoRegistry::new(vec![d.clone(), d]),
            Err(ConfigError::DuplicateDemo(_))
        ));
    }

    #[test]
    fn loads_definitions_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":"custom","defaultPrompt":"hi","pollIntervalMs":500,"runHistoryLimit":3,
                "ticketIdFields":["refs"],"resultViews":["table"]}}]"#
        )
        .unwrap();

        let reg = DemoRegistry::load(Some(file.path())).unwrap();
        let custom = reg.get("custom").unwrap();
        assert_eq!(custom.poll_interval(), Duration::from_millis(500));
        assert_eq!(custom.ticket_id_fields, vec!["refs".to_string()]);
    }

    #[test]
    fn invalid_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = DemoRegistry::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
