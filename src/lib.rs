use std::path::Path;

pub mod codec;
pub mod error;
pub mod face;
pub mod fingerprint;
pub mod image_utils;
pub mod io;
pub mod pipeline;
pub mod report;
pub mod watermark;

pub use codec::{DctCodec, StampConfig, TextStamp};
pub use error::{MarkError, Result};
pub use face::{
    FaceBounds, FaceDetector, FaceFeature, FaceRegion, FacialRegionPerturber, LandmarkPredictor,
    NoFaceDetector, PerturbConfig, PerturbOutcome,
};
pub use fingerprint::{ContentDigest, ContentFingerprinter, WatermarkPayload};
pub use io::{FileCodec, ImageLoader, ImageWriter};
pub use pipeline::{DegradationTier, PipelineConfig, PipelineController, PipelineResult};
pub use report::ProcessReport;
pub use watermark::{EmbedConfig, PayloadEmbedder};

/// Marks `input` into `output` with the default configuration and no face model.
pub fn process_image<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<PipelineResult> {
    PipelineController::new().process(input, output)
}
