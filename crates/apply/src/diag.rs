//! Diagnostics returned alongside (or instead of) a new state.

use std::fmt;

use serde::{Deserialize, Serialize};

use manifold_core::StoreStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { severity: Severity::Error, summary: summary.into(), detail: detail.into() }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if self.detail.is_empty() {
            write!(f, "{}: {}", sev, self.summary)
        } else {
            write!(f, "{}: {}: {}", sev, self.summary, self.detail)
        }
    }
}

/// One diagnostic per status cause; a single status diagnostic when there are none.
pub fn status_diagnostics(status: &StoreStatus) -> Vec<Diagnostic> {
    if status.causes.is_empty() {
        return vec![Diagnostic::error(format!("API response status: {}", status.status), status.message.clone())];
    }
    status
        .causes
        .iter()
        .map(|c| {
            let summary = if c.field.is_empty() { c.reason.clone() } else { c.field.clone() };
            Diagnostic::error(summary, c.message.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::StatusCause;

    #[test]
    fn causes_become_individual_diagnostics() {
        let status = StoreStatus {
            status: "Failure".into(),
            code: 422,
            reason: "Invalid".into(),
            message: "Deployment.apps \"web\" is invalid".into(),
            causes: vec![
                StatusCause { field: "spec.replicas".into(), reason: "FieldValueInvalid".into(), message: "must be >= 0".into() },
                StatusCause { field: String::new(), reason: "FieldValueRequired".into(), message: "selector required".into() },
            ],
        };
        let d = status_diagnostics(&status);
        assert_eq!(d.len(), 2);
        assert_eq!(d[0].summary, "spec.replicas");
        assert_eq!(d[0].detail, "must be >= 0");
        assert_eq!(d[1].summary, "FieldValueRequired");
        assert!(d.iter().all(Diagnostic::is_error));
    }

    #[test]
    fn causeless_status_is_one_diagnostic() {
        let status = StoreStatus { status: "Failure".into(), code: 403, reason: "Forbidden".into(), message: "denied".into(), causes: vec![] };
        let d = status_diagnostics(&status);
        assert_eq!(d, vec![Diagnostic::error("API response status: Failure", "denied")]);
        assert_eq!(d[0].to_string(), "error: API response status: Failure: denied");
    }
}
