use serde::{Deserialize, Serialize};

/// Which values a bulk grant writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTemplate {
    /// Inherited full access (flag set, `*` injected on read).
    FullAccess,
    /// Each field's documented default set, no inheritance.
    DefaultAccess,
}

/// Which inheritance flag a full-access bulk grant sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeLevel {
    Module,
    Object,
}

/// Module-level cascade actions, applied per role + module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleAction {
    SelectAll,
    ResetDefault,
    ClearCascade,
    RemoveAll,
}

impl ModuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelectAll => "select_all",
            Self::ResetDefault => "reset_default",
            Self::ClearCascade => "clear_cascade",
            Self::RemoveAll => "remove_all",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "select_all" => Some(Self::SelectAll),
            "reset_default" => Some(Self::ResetDefault),
            "clear_cascade" => Some(Self::ClearCascade),
            "remove_all" => Some(Self::RemoveAll),
            _ => None,
        }
    }

    /// Actions that revoke access and need caller confirmation.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::RemoveAll)
    }
}

impl std::fmt::Display for ModuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the caller obtained explicit confirmation for a destructive call.
///
/// The engine never prompts; callers that revoke access pass `Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Unconfirmed,
    Confirmed,
}

impl Confirmation {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

/// Input for the batch grant operation.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkAssign {
    pub role_id: String,
    #[serde(default)]
    pub object_ids: Vec<String>,
    pub template: AccessTemplate,
    pub cascade_level: CascadeLevel,
    /// Restrict to one module; with no `object_ids`, every active object of it.
    #[serde(default)]
    pub module: Option<String>,
}

/// One object a batch could not write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub object_id: String,
    pub cause: String,
}

/// Per-object outcome of a batch write.
///
/// Objects listed in `succeeded` stay committed even when others fail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub role_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub succeeded: Vec<String>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn new(role_id: &str, module: Option<&str>) -> Self {
        Self {
            role_id: role_id.to_string(),
            module: module.map(str::to_string),
            succeeded: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self, object_id: &str) {
        self.succeeded.push(object_id.to_string());
    }

    pub fn record_failure(&mut self, object_id: &str, cause: impl std::fmt::Display) {
        self.failures.push(BatchFailure {
            object_id: object_id.to_string(),
            cause: cause.to_string(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.object_id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_action_names_roundtrip() {
        for action in [
            ModuleAction::SelectAll,
            ModuleAction::ResetDefault,
            ModuleAction::ClearCascade,
            ModuleAction::RemoveAll,
        ] {
            assert_eq!(ModuleAction::from_str(action.as_str()), Some(action));
        }
        assert_eq!(ModuleAction::from_str("grant_everything"), None);
    }

    #[test]
    fn report_counts() {
        let mut report = BatchReport::new("PM1", Some("materials"));
        report.record_success("M_VIEW");
        report.record_failure("M_EDIT", "storage: disk full");
        assert!(!report.is_complete());
        assert_eq!(report.attempted(), 2);
        assert_eq!(report.failed_ids(), vec!["M_EDIT"]);
    }
}
