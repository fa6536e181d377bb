//! Output of the external face capture step.

use crate::types::Descriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a capture attempt produced no descriptor. Always recoverable by
/// capturing again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureFailure {
    NoFaceDetected,
    MultipleFacesDetected,
    AnalysisFailed,
}

impl CaptureFailure {
    /// User-facing message for this failure.
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoFaceDetected => {
                "No face detected. Please position your face clearly in the frame."
            }
            Self::MultipleFacesDetected => {
                "Multiple faces detected. Please ensure only one face is visible."
            }
            Self::AnalysisFailed => "Error analyzing face. Please try again.",
        }
    }
}

impl fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A single capture attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Captured {
        descriptor: Descriptor,
        /// Reference to the captured preview image, handed through to enrollment.
        preview: Option<String>,
    },
    Failed(CaptureFailure),
}

/// Wire form of a capture result as written by the capture collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureReport {
    pub success: bool,
    #[serde(default)]
    pub descriptor: Option<Vec<f32>>,
    #[serde(default)]
    pub reason: Option<CaptureFailure>,
    #[serde(default)]
    pub preview: Option<String>,
}

impl From<CaptureReport> for CaptureOutcome {
    fn from(report: CaptureReport) -> Self {
        match (report.success, report.descriptor) {
            (true, Some(values)) => CaptureOutcome::Captured {
                descriptor: Descriptor::from_raw(values),
                preview: report.preview,
            },
            (true, None) => CaptureOutcome::Failed(CaptureFailure::AnalysisFailed),
            (false, _) => {
                CaptureOutcome::Failed(report.reason.unwrap_or(CaptureFailure::AnalysisFailed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_success() {
        let report: CaptureReport =
            serde_json::from_str(r#"{"success":true,"descriptor":[0.25,0.5],"preview":"face.png"}"#)
                .unwrap();
        match CaptureOutcome::from(report) {
            CaptureOutcome::Captured { descriptor, preview } => {
                assert_eq!(descriptor.values(), &[0.25, 0.5]);
                assert_eq!(preview.as_deref(), Some("face.png"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_report_failure_reason() {
        let report: CaptureReport =
            serde_json::from_str(r#"{"success":false,"reason":"MultipleFacesDetected"}"#).unwrap();
        assert_eq!(
            CaptureOutcome::from(report),
            CaptureOutcome::Failed(CaptureFailure::MultipleFacesDetected)
        );
    }

    #[test]
    fn test_report_success_without_descriptor() {
        let report: CaptureReport = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert_eq!(
            CaptureOutcome::from(report),
            CaptureOutcome::Failed(CaptureFailure::AnalysisFailed)
        );
    }

    #[test]
    fn test_failure_without_reason_defaults_to_analysis() {
        let report: CaptureReport = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert_eq!(
            CaptureOutcome::from(report),
            CaptureOutcome::Failed(CaptureFailure::AnalysisFailed)
        );
    }
}
