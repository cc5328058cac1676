use std::{
    f64::consts::PI,
    io::Cursor,
    path::{Path, PathBuf},
};

use image::{GrayImage, Rgb, RgbImage, codecs::jpeg::JpegEncoder};
use imageproc::point::Point;
use security_mark::{
    DegradationTier, FaceBounds, FaceDetector, FileCodec, ImageLoader, ImageWriter,
    LandmarkPredictor, MarkError, PipelineConfig, PipelineController, StampConfig, TextStamp,
    error::Result,
};
use tempfile::TempDir;

struct FixedDetector(Vec<FaceBounds>);

impl FaceDetector for FixedDetector {
    fn detect(&self, _gray: &GrayImage) -> Result<Vec<FaceBounds>> {
        Ok(self.0.clone())
    }
}

struct FailingDetector;

impl FaceDetector for FailingDetector {
    fn detect(&self, _gray: &GrayImage) -> Result<Vec<FaceBounds>> {
        Err(MarkError::Detection("malformed buffer".into()))
    }
}

/// Places the 68 landmarks on rings inside the reported box.
struct RingPredictor;

impl RingPredictor {
    fn ring(center: (i32, i32), radius: f64, count: usize) -> Vec<Point<i32>> {
        (0..count)
            .map(|i| {
                let angle = 2.0 * PI * i as f64 / count as f64;
                Point::new(
                    center.0 + (radius * angle.cos()).round() as i32,
                    center.1 + (radius * angle.sin()).round() as i32,
                )
            })
            .collect()
    }
}

impl LandmarkPredictor for RingPredictor {
    fn predict(&self, _gray: &GrayImage, face: &FaceBounds) -> Result<Vec<Point<i32>>> {
        let cx = face.x + face.width as i32 / 2;
        let cy = face.y + face.height as i32 / 2;

        let mut points = Self::ring((cx, cy), 30.0, 27);
        points.extend(Self::ring((cx, cy + 2), 5.0, 9));
        points.extend(Self::ring((cx - 12, cy - 10), 4.0, 6));
        points.extend(Self::ring((cx + 12, cy - 10), 4.0, 6));
        points.extend(Self::ring((cx, cy + 14), 7.0, 20));
        Ok(points)
    }
}

struct FailingWriter;

impl ImageWriter for FailingWriter {
    fn write(&self, _image: &RgbImage, path: &Path) -> Result<()> {
        Err(MarkError::Write(format!("{}: read-only volume", path.display())))
    }
}

/// Decodes the caller's file but refuses anything inside `scratch`, i.e. the normalized copy.
struct ArtifactRejectingLoader {
    scratch: PathBuf,
}

impl ImageLoader for ArtifactRejectingLoader {
    fn load(&self, path: &Path) -> Result<RgbImage> {
        if path.starts_with(&self.scratch) {
            return Err(MarkError::Decode("normalized copy unreadable".into()));
        }
        FileCodec.load(path)
    }
}

struct Workspace {
    dir: TempDir,
    scratch: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            dir: tempfile::tempdir().unwrap(),
            scratch: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_input(&self, name: &str, image: &RgbImage) -> PathBuf {
        let path = self.path(name);
        image.save(&path).unwrap();
        path
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            temp_dir: Some(self.scratch.path().to_path_buf()),
            seed: Some(42),
            ..PipelineConfig::default()
        }
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path()).unwrap().next().is_none()
    }
}

fn face_bounds() -> FaceBounds {
    FaceBounds {
        x: 18,
        y: 18,
        width: 60,
        height: 60,
    }
}

fn portrait() -> RgbImage {
    RgbImage::from_fn(96, 96, |x, y| Rgb([(100 + x / 4) as u8, (90 + y / 4) as u8, 110]))
}

/// What the pipeline's normalization step produces for `image`.
fn jpeg_normalized(image: &RgbImage) -> RgbImage {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, 95))
        .unwrap();
    image::load_from_memory(buffer.get_ref()).unwrap().to_rgb8()
}

#[test]
fn test_black_image_without_detector_is_no_face() {
    let ws = Workspace::new();
    let input = ws.write_input("black.png", &RgbImage::new(64, 64));
    let output = ws.path("marked.png");

    let result = PipelineController::with_config(ws.config())
        .unwrap()
        .process(&input, &output)
        .unwrap();

    assert_eq!(result.tier, DegradationTier::NoFace);
    assert_eq!(result.output_path, output);
    assert_eq!(image::image_dimensions(&output).unwrap(), (64, 64));
    assert!(ws.scratch_is_empty());
}

#[test]
fn test_zero_byte_input_is_decode_error_without_output() {
    let ws = Workspace::new();
    let input = ws.path("empty.jpg");
    std::fs::write(&input, b"").unwrap();
    let output = ws.path("marked.png");

    let err = PipelineController::with_config(ws.config())
        .unwrap()
        .process(&input, &output)
        .unwrap_err();

    assert!(matches!(err, MarkError::Decode(_)));
    assert!(!output.exists());
    assert!(ws.scratch_is_empty());
}

#[test]
fn test_missing_input_is_input_missing() {
    let ws = Workspace::new();
    let output = ws.path("marked.png");

    let err = PipelineController::with_config(ws.config())
        .unwrap()
        .process(ws.path("never_uploaded.jpg"), &output)
        .unwrap_err();

    assert!(matches!(err, MarkError::InputMissing(_)));
    assert!(!output.exists());
}

#[test]
fn test_detector_failure_still_watermarks() {
    let ws = Workspace::new();
    let input = ws.write_input("portrait.png", &portrait());
    let output = ws.path("marked.png");

    let result = PipelineController::with_config(ws.config())
        .unwrap()
        .with_detector(FailingDetector)
        .process(&input, &output)
        .unwrap();

    assert_eq!(result.tier, DegradationTier::DetectionFailed);
    assert!(result.tier.has_watermark());
    assert_eq!(image::image_dimensions(&output).unwrap(), (96, 96));
    assert!(ws.scratch_is_empty());
}

#[test]
fn test_short_landmark_set_counts_as_detection_failure() {
    struct ShortPredictor;
    impl LandmarkPredictor for ShortPredictor {
        fn predict(&self, _gray: &GrayImage, _face: &FaceBounds) -> Result<Vec<Point<i32>>> {
            Ok(vec![Point::new(1, 1); 12])
        }
    }

    let ws = Workspace::new();
    let input = ws.write_input("portrait.png", &portrait());
    let result = PipelineController::with_config(ws.config())
        .unwrap()
        .with_detector(FixedDetector(vec![face_bounds()]))
        .with_predictor(ShortPredictor)
        .process(&input, ws.path("marked.png"))
        .unwrap();

    assert_eq!(result.tier, DegradationTier::DetectionFailed);
}

/// Returns the same 68 landmarks whatever box the detector reported.
struct FixedLandmarks(Vec<Point<i32>>);

impl LandmarkPredictor for FixedLandmarks {
    fn predict(&self, _gray: &GrayImage, _face: &FaceBounds) -> Result<Vec<Point<i32>>> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_degenerate_landmarks_still_produce_output() {
    let ws = Workspace::new();
    let input = ws.write_input("portrait.png", &portrait());

    let mut straddling: Vec<Point<i32>> = (0..68).map(|i| Point::new(i * 3 - 40, 90 + i)).collect();
    straddling[40] = Point::new(-300, 20);

    let landmark_sets = [
        vec![Point::new(12, 12); 68],
        vec![Point::new(-50, 400); 68],
        (0..68).map(|i| Point::new(10 + i, 30)).collect(),
        straddling,
    ];

    for (i, landmarks) in landmark_sets.into_iter().enumerate() {
        let output = ws.path(&format!("degenerate_{i}.png"));
        let result = PipelineController::with_config(ws.config())
            .unwrap()
            .with_detector(FixedDetector(vec![face_bounds()]))
            .with_predictor(FixedLandmarks(landmarks))
            .process(&input, &output)
            .unwrap();

        assert_eq!(result.tier, DegradationTier::Full, "landmark set {i}");
        assert_eq!(image::image_dimensions(&output).unwrap(), (96, 96));
    }

    assert!(ws.scratch_is_empty());
}

#[test]
fn test_embed_failure_leaves_only_fallback_stamp() {
    let ws = Workspace::new();
    let source = portrait();
    let input = ws.write_input("portrait.png", &source);
    let output = ws.path("marked.png");

    let mut config = ws.config();
    config.embed.strength = f64::NAN;

    let result = PipelineController::with_config(config)
        .unwrap()
        .process(&input, &output)
        .unwrap();

    assert_eq!(result.tier, DegradationTier::EmbedFailed);
    assert!(!result.tier.has_watermark());

    let written = FileCodec.load(&output).unwrap();
    let expected = TextStamp::stamped(&jpeg_normalized(&source), &StampConfig::fallback());
    assert_eq!(written, expected);
    assert!(ws.scratch_is_empty());
}

#[test]
fn test_faces_are_perturbed_at_full_tier() {
    let ws = Workspace::new();
    let input = ws.write_input("portrait.png", &portrait());
    let output = ws.path("marked.png");

    let result = PipelineController::with_config(ws.config())
        .unwrap()
        .with_detector(FixedDetector(vec![face_bounds()]))
        .with_predictor(RingPredictor)
        .process(&input, &output)
        .unwrap();

    assert_eq!(result.tier, DegradationTier::Full);
    assert_eq!(result.faces, 1);
    assert!(result.decoys <= 35);
    assert_eq!(image::image_dimensions(&output).unwrap(), (96, 96));
    assert!(ws.scratch_is_empty());
}

#[test]
fn test_unreadable_normalized_copy_stamps_original() {
    let ws = Workspace::new();
    let source = portrait();
    let input = ws.write_input("portrait.png", &source);
    let output = ws.path("marked.png");

    let result = PipelineController::with_config(ws.config())
        .unwrap()
        .with_loader(ArtifactRejectingLoader {
            scratch: ws.scratch.path().to_path_buf(),
        })
        .process(&input, &output)
        .unwrap();

    assert_eq!(result.tier, DegradationTier::TotalFailure);
    let expected = TextStamp::stamped(&source, &StampConfig::fallback());
    assert_eq!(FileCodec.load(&output).unwrap(), expected);
    assert!(ws.scratch_is_empty());
}

#[test]
fn test_write_failure_is_surfaced_and_cleans_up() {
    let ws = Workspace::new();
    let input = ws.write_input("portrait.png", &portrait());

    let err = PipelineController::with_config(ws.config())
        .unwrap()
        .with_writer(FailingWriter)
        .process(&input, ws.path("marked.png"))
        .unwrap_err();

    assert!(matches!(err, MarkError::Write(_)));
    assert!(ws.scratch_is_empty());
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let ws = Workspace::new();
    let input = ws.write_input("portrait.png", &portrait());
    let controller = PipelineController::with_config(ws.config())
        .unwrap()
        .with_detector(FixedDetector(vec![face_bounds()]))
        .with_predictor(RingPredictor);

    let first = controller.process(&input, ws.path("a.png")).unwrap();
    let second = controller.process(&input, ws.path("b.png")).unwrap();

    assert_eq!(first.digest, second.digest);
    assert_eq!(first.decoys, second.decoys);
    assert_eq!(
        FileCodec.load(&ws.path("a.png")).unwrap(),
        FileCodec.load(&ws.path("b.png")).unwrap()
    );
}

#[test]
fn test_every_detector_and_embedder_outcome_produces_output() {
    let ws = Workspace::new();
    let input = ws.write_input("portrait.png", &portrait());

    for strength in [150.0, f64::NAN] {
        let mut config = ws.config();
        config.embed.strength = strength;

        let controllers = [
            PipelineController::with_config(config.clone()).unwrap(),
            PipelineController::with_config(config.clone())
                .unwrap()
                .with_detector(FailingDetector),
            PipelineController::with_config(config.clone())
                .unwrap()
                .with_detector(FixedDetector(vec![face_bounds()]))
                .with_predictor(RingPredictor),
        ];

        for (i, controller) in controllers.iter().enumerate() {
            let output = ws.path(&format!("out_{i}_{}.png", strength.is_nan()));
            let result = controller.process(&input, &output).unwrap();

            assert!(output.exists(), "tier {}", result.tier);
            assert_eq!(image::image_dimensions(&output).unwrap(), (96, 96));
            assert_eq!(result.tier == DegradationTier::EmbedFailed, strength.is_nan());
        }
    }

    assert!(ws.scratch_is_empty());
}
