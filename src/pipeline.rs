use std::{
    fmt,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use image::RgbImage;
use log::{error, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::{
    codec::{StampConfig, TextStamp},
    error::{MarkError, Result},
    face::{
        FaceDetector, FacialRegionPerturber, LandmarkPredictor, NoFaceDetector, PerturbConfig,
        PerturbOutcome, locate_faces,
    },
    fingerprint::{ContentDigest, ContentFingerprinter},
    io::{FileCodec, ImageLoader, ImageWriter, normalize},
    watermark::{EmbedConfig, PayloadEmbedder},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationTier {
    Full,
    NoFace,
    DetectionFailed,
    EmbedFailed,
    TotalFailure,
}

impl DegradationTier {
    /// Whether the frequency-domain watermark is present in the output.
    pub fn has_watermark(&self) -> bool {
        matches!(
            self,
            DegradationTier::Full | DegradationTier::NoFace | DegradationTier::DetectionFailed
        )
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self, DegradationTier::Full | DegradationTier::NoFace)
    }
}

impl fmt::Display for DegradationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DegradationTier::Full => "full",
            DegradationTier::NoFace => "no_face",
            DegradationTier::DetectionFailed => "detection_failed",
            DegradationTier::EmbedFailed => "embed_failed",
            DegradationTier::TotalFailure => "total_failure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub output_path: PathBuf,
    pub tier: DegradationTier,
    pub digest: ContentDigest,
    pub faces: usize,
    pub decoys: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub embed: EmbedConfig,
    pub perturb: PerturbConfig,
    pub fallback_stamp: StampConfig,
    /// JPEG quality of the normalized working copy.
    pub normalized_quality: u8,
    /// Where the normalized copy is written; the system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
    /// Fixed seed for noise and decoy placement; fresh entropy per request when unset.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embed: EmbedConfig::default(),
            perturb: PerturbConfig::default(),
            fallback_stamp: StampConfig::fallback(),
            normalized_quality: 95,
            temp_dir: None,
            seed: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader).map_err(|e| {
            MarkError::InvalidParameter(format!("config {}: {e}", path.display()))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that can never produce an image.
    ///
    /// A non-finite embedding strength is accepted; it makes the embedder fail
    /// and the pipeline fall back to the visible stamp.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.normalized_quality) {
            return Err(MarkError::InvalidParameter(format!(
                "normalized_quality must be 1..=100, got {}",
                self.normalized_quality
            )));
        }

        if self.embed.offset_divisor == 0 {
            return Err(MarkError::InvalidParameter(
                "offset_divisor must be positive".into(),
            ));
        }

        if !(1..=64).contains(&self.embed.payload_hex_chars) {
            return Err(MarkError::InvalidParameter(format!(
                "payload_hex_chars must be 1..=64, got {}",
                self.embed.payload_hex_chars
            )));
        }

        let sigmas = [
            ("dither_sigma", self.embed.dither_sigma),
            ("noise_sigma", self.embed.noise_sigma),
            ("noise_ratio", self.perturb.noise_ratio),
        ];
        for (name, value) in sigmas {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(MarkError::InvalidParameter(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }

        if self.perturb.decoy_radius < 0 {
            return Err(MarkError::InvalidParameter(
                "decoy_radius must not be negative".into(),
            ));
        }

        Ok(())
    }
}

struct StageOutcome {
    image: RgbImage,
    tier: DegradationTier,
    faces: usize,
    decoys: usize,
}

/// Settles each request into exactly one [`DegradationTier`], moving only downward.
pub struct PipelineController {
    config: PipelineConfig,
    loader: Box<dyn ImageLoader>,
    writer: Box<dyn ImageWriter>,
    detector: Box<dyn FaceDetector>,
    predictor: Box<dyn LandmarkPredictor>,
    embedder: PayloadEmbedder,
    perturber: FacialRegionPerturber,
}

impl PipelineController {
    /// Controller with the filesystem codec and no face model.
    pub fn new() -> Self {
        Self::build(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: PipelineConfig) -> Self {
        Self {
            embedder: PayloadEmbedder::with_config(config.embed.clone()),
            perturber: FacialRegionPerturber::with_config(config.perturb.clone()),
            config,
            loader: Box::new(FileCodec),
            writer: Box::new(FileCodec),
            detector: Box::new(NoFaceDetector),
            predictor: Box::new(NoFaceDetector),
        }
    }

    pub fn with_loader(mut self, loader: impl ImageLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_writer(mut self, writer: impl ImageWriter + 'static) -> Self {
        self.writer = Box::new(writer);
        self
    }

    pub fn with_detector(mut self, detector: impl FaceDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn with_predictor(mut self, predictor: impl LandmarkPredictor + 'static) -> Self {
        self.predictor = Box::new(predictor);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
    ) -> Result<PipelineResult> {
        let (input, output) = (input.as_ref(), output.as_ref());

        if !input.is_file() {
            error!("input {} does not exist", input.display());
            return Err(MarkError::InputMissing(input.to_path_buf()));
        }

        let digest = ContentFingerprinter::digest_file(input)?;
        info!("processing {} (digest {})", input.display(), digest.truncated(16));

        let normalized = match normalize(
            self.loader.as_ref(),
            input,
            self.config.normalized_quality,
            self.config.temp_dir.as_deref(),
        ) {
            Ok(normalized) => normalized,
            Err(err) => {
                warn!("normalization failed ({err}); stamping the original input");
                return self.stamp_original(input, output, digest);
            }
        };

        let mut rng = self.rng();
        let outcome = self.run_stages(&normalized.image, &digest, &mut rng);
        normalized.cleanup();

        self.writer.write(&outcome.image, output)?;
        if outcome.tier.is_degraded() {
            warn!("wrote {} at degraded tier {}", output.display(), outcome.tier);
        } else {
            info!("wrote {} at tier {}", output.display(), outcome.tier);
        }

        Ok(PipelineResult {
            output_path: output.to_path_buf(),
            tier: outcome.tier,
            digest,
            faces: outcome.faces,
            decoys: outcome.decoys,
        })
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn run_stages<R: Rng>(
        &self,
        normalized: &RgbImage,
        digest: &ContentDigest,
        rng: &mut R,
    ) -> StageOutcome {
        let (perturbed, tier, faces) = match self.detect_and_perturb(normalized, rng) {
            Ok(Some((outcome, faces))) => {
                info!("{faces} face(s) perturbed, {} decoys placed", outcome.decoys.len());
                (Some(outcome), DegradationTier::Full, faces)
            }
            Ok(None) => {
                info!("no face detected; embedding into the normalized image");
                (None, DegradationTier::NoFace, 0)
            }
            Err(err) => {
                warn!("face detection failed ({err}); embedding into the normalized image");
                (None, DegradationTier::DetectionFailed, 0)
            }
        };

        let decoys = perturbed.as_ref().map_or(0, |p| p.decoys.len());
        let working = perturbed.as_ref().map_or(normalized, |p| &p.image);

        match self.embedder.embed(working, digest, rng) {
            Ok(image) => StageOutcome {
                image,
                tier,
                faces,
                decoys,
            },
            Err(err) => {
                warn!("embedding failed after tier {tier} ({err}); applying the visible stamp only");
                StageOutcome {
                    image: TextStamp::stamped(working, &self.config.fallback_stamp),
                    tier: DegradationTier::EmbedFailed,
                    faces,
                    decoys,
                }
            }
        }
    }

    fn detect_and_perturb<R: Rng>(
        &self,
        image: &RgbImage,
        rng: &mut R,
    ) -> Result<Option<(PerturbOutcome, usize)>> {
        let faces = locate_faces(self.detector.as_ref(), self.predictor.as_ref(), image)?;
        if faces.is_empty() {
            return Ok(None);
        }

        let outcome = self.perturber.perturb(image, &faces, rng)?;
        Ok(Some((outcome, faces.len())))
    }

    fn stamp_original(
        &self,
        input: &Path,
        output: &Path,
        digest: ContentDigest,
    ) -> Result<PipelineResult> {
        let original = match self.loader.load(input) {
            Ok(image) => image,
            Err(err) => {
                error!("cannot decode original input {}: {err}", input.display());
                return Err(match err {
                    decode @ MarkError::Decode(_) => decode,
                    other => MarkError::Decode(other.to_string()),
                });
            }
        };

        let stamped = TextStamp::stamped(&original, &self.config.fallback_stamp);
        self.writer.write(&stamped, output)?;
        warn!(
            "wrote {} at tier {}",
            output.display(),
            DegradationTier::TotalFailure
        );

        Ok(PipelineResult {
            output_path: output.to_path_buf(),
            tier: DegradationTier::TotalFailure,
            digest,
            faces: 0,
            decoys: 0,
        })
    }
}

impl Default for PipelineController {
    fn default() -> Self {
        Self::new()
    }
}
