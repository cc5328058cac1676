use std::path::PathBuf;

use serde::Serialize;

use crate::{
    error::MarkError,
    pipeline::{DegradationTier, PipelineResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

/// Response body handed back to whatever front end invoked the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub status: ReportStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticsSection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsSection {
    pub tier: DegradationTier,
    pub watermarked: bool,
    pub digest: String,
    pub faces: usize,
    pub decoys: usize,
}

impl From<&PipelineResult> for ProcessReport {
    fn from(result: &PipelineResult) -> Self {
        let message = match result.tier {
            DegradationTier::Full | DegradationTier::NoFace => "Image processed successfully",
            DegradationTier::DetectionFailed => {
                "Image watermarked; face protection was skipped"
            }
            DegradationTier::EmbedFailed | DegradationTier::TotalFailure => {
                "Image marked with a visible stamp only"
            }
        };

        Self {
            status: ReportStatus::Success,
            message: message.into(),
            output_path: Some(result.output_path.clone()),
            diagnostics: Some(DiagnosticsSection {
                tier: result.tier,
                watermarked: result.tier.has_watermark(),
                digest: result.digest.to_string(),
                faces: result.faces,
                decoys: result.decoys,
            }),
        }
    }
}

impl From<&MarkError> for ProcessReport {
    fn from(err: &MarkError) -> Self {
        Self {
            status: ReportStatus::Error,
            message: err.to_string(),
            output_path: None,
            diagnostics: None,
        }
    }
}

impl ProcessReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn summary(&self) -> String {
        match (&self.output_path, &self.diagnostics) {
            (Some(path), Some(diag)) => format!(
                "{} -> {} [tier: {}, faces: {}, decoys: {}]",
                self.message,
                path.display(),
                diag.tier,
                diag.faces,
                diag.decoys
            ),
            _ => format!("error: {}", self.message),
        }
    }
}
