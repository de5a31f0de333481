use manifold_core::ConversionError;
use thiserror::Error;

use crate::diag::Diagnostic;

/// Failure of one apply call.
///
/// `Validation`, `Conflict`, `Store` and `Rejected` are reported to the caller as
/// diagnostics on an otherwise successful response; the rest fail the call.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("validation: {summary}: {detail}")]
    Validation { summary: String, detail: String },
    #[error("conflict: {summary}: {detail}")]
    Conflict { summary: String, detail: String },
    #[error("store: {summary}: {detail}")]
    Store { summary: String, detail: String },
    #[error("rejected with {} diagnostic(s)", .0.len())]
    Rejected(Vec<Diagnostic>),
    #[error("resource was applied but waiting for completion failed: {0:#}")]
    Wait(anyhow::Error),
    #[error("internal: {0:#}")]
    Internal(anyhow::Error),
    #[error("conversion: {0}")]
    Conversion(#[from] ConversionError),
    #[error("apply cancelled")]
    Cancelled,
}

impl ApplyError {
    pub fn validation(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        ApplyError::Validation { summary: summary.into(), detail: detail.into() }
    }

    pub fn store(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        ApplyError::Store { summary: summary.into(), detail: detail.into() }
    }

    /// Diagnostics for the kinds reported in-band; the error itself otherwise.
    pub fn into_diagnostics(self) -> Result<Vec<Diagnostic>, ApplyError> {
        match self {
            ApplyError::Validation { summary, detail } | ApplyError::Conflict { summary, detail } | ApplyError::Store { summary, detail } => {
                Ok(vec![Diagnostic::error(summary, detail)])
            }
            ApplyError::Rejected(diags) => Ok(diags),
            other => Err(other),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApplyError::Validation { .. } => "validation",
            ApplyError::Conflict { .. } => "conflict",
            ApplyError::Store { .. } => "store",
            ApplyError::Rejected(_) => "rejected",
            ApplyError::Wait(_) => "wait",
            ApplyError::Internal(_) => "internal",
            ApplyError::Conversion(_) => "conversion",
            ApplyError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::Path;

    #[test]
    fn in_band_kinds_render_as_diagnostics() {
        let d = ApplyError::validation("bad", "input").into_diagnostics().expect("in band");
        assert_eq!(d, vec![Diagnostic::error("bad", "input")]);
        let d = ApplyError::Rejected(vec![Diagnostic::error("a", ""), Diagnostic::error("b", "")]).into_diagnostics().expect("in band");
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn fatal_kinds_stay_errors() {
        assert!(matches!(ApplyError::Cancelled.into_diagnostics(), Err(ApplyError::Cancelled)));
        let conv = ApplyError::from(ConversionError::new(&Path::root().attr("spec"), "boom"));
        assert_eq!(conv.kind(), "conversion");
        assert!(conv.into_diagnostics().is_err());
        let wait = ApplyError::Wait(anyhow::anyhow!("timed out"));
        assert!(wait.to_string().contains("was applied"));
    }
}
