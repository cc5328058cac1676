pub mod perturb;

use std::ops::Range;

use image::{GrayImage, RgbImage};
use imageproc::point::Point;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{MarkError, Result},
    image_utils::rgb_to_gray,
};

pub use perturb::{FacialRegionPerturber, PerturbConfig, PerturbOutcome};

pub const LANDMARK_COUNT: usize = 68;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceFeature {
    RightEye,
    LeftEye,
    Nose,
    Mouth,
}

impl FaceFeature {
    pub const ALL: [FaceFeature; 4] = [
        FaceFeature::RightEye,
        FaceFeature::LeftEye,
        FaceFeature::Nose,
        FaceFeature::Mouth,
    ];

    pub fn landmark_range(&self) -> Range<usize> {
        match self {
            FaceFeature::RightEye => 36..42,
            FaceFeature::LeftEye => 42..48,
            FaceFeature::Nose => 27..36,
            FaceFeature::Mouth => 48..68,
        }
    }
}

/// Axis-aligned box reported by a [`FaceDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Ordered landmark points of one detected face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceRegion {
    landmarks: Vec<Point<i32>>,
}

impl FaceRegion {
    pub fn new(landmarks: Vec<Point<i32>>) -> Result<Self> {
        if landmarks.len() < LANDMARK_COUNT {
            return Err(MarkError::Detection(format!(
                "expected {} landmarks, predictor returned {}",
                LANDMARK_COUNT,
                landmarks.len()
            )));
        }

        Ok(Self { landmarks })
    }

    pub fn landmarks(&self) -> &[Point<i32>] {
        &self.landmarks
    }

    pub fn feature_polygon(&self, feature: FaceFeature) -> &[Point<i32>] {
        &self.landmarks[feature.landmark_range()]
    }
}

pub trait FaceDetector: Send + Sync {
    /// Returns an empty list for face-free images; errors only on unusable input.
    fn detect(&self, gray: &GrayImage) -> Result<Vec<FaceBounds>>;
}

pub trait LandmarkPredictor: Send + Sync {
    fn predict(&self, gray: &GrayImage, face: &FaceBounds) -> Result<Vec<Point<i32>>>;
}

/// Stand-in used when no landmark model is available: never finds a face.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaceDetector;

impl FaceDetector for NoFaceDetector {
    fn detect(&self, _gray: &GrayImage) -> Result<Vec<FaceBounds>> {
        Ok(Vec::new())
    }
}

impl LandmarkPredictor for NoFaceDetector {
    fn predict(&self, _gray: &GrayImage, _face: &FaceBounds) -> Result<Vec<Point<i32>>> {
        Err(MarkError::Detection("no landmark model loaded".into()))
    }
}

/// Runs the detector on the luminance image, then the predictor on each face found.
pub fn locate_faces(
    detector: &dyn FaceDetector,
    predictor: &dyn LandmarkPredictor,
    image: &RgbImage,
) -> Result<Vec<FaceRegion>> {
    let gray = rgb_to_gray(image);
    let bounds = detector.detect(&gray)?;
    debug!("detector reported {} face(s)", bounds.len());

    bounds
        .iter()
        .map(|face| FaceRegion::new(predictor.predict(&gray, face)?))
        .collect()
}
