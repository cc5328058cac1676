use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::{
    drawing::{draw_filled_circle_mut, draw_polygon_mut},
    point::Point,
};
use log::debug;
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{MarkError, Result},
    face::{FaceFeature, FaceRegion},
    image_utils::{gaussian_field, rgb_to_planes, to_sample},
};

const MASK_ON: u8 = 255;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbConfig {
    /// Noise std-dev as a fraction of `max_sample`.
    pub noise_ratio: f64,
    pub max_sample: f64,
    pub decoy_count: usize,
    pub decoy_radius: i32,
    pub decoy_intensity: f32,
}

impl Default for PerturbConfig {
    fn default() -> Self {
        Self {
            noise_ratio: 0.08,
            max_sample: 255.0,
            decoy_count: 35,
            decoy_radius: 1,
            decoy_intensity: 50.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerturbOutcome {
    pub image: RgbImage,
    /// 255 inside any eye, nose or mouth polygon, 0 elsewhere.
    pub mask: GrayImage,
    /// Accepted decoy centres as `(x, y)`.
    pub decoys: Vec<(u32, u32)>,
}

pub struct FacialRegionPerturber {
    config: PerturbConfig,
}

impl FacialRegionPerturber {
    pub fn new() -> Self {
        Self::with_config(PerturbConfig::default())
    }

    pub fn with_config(config: PerturbConfig) -> Self {
        Self { config }
    }

    pub fn perturb<R: Rng + ?Sized>(
        &self,
        image: &RgbImage,
        faces: &[FaceRegion],
        rng: &mut R,
    ) -> Result<PerturbOutcome> {
        let (width, height) = image.dimensions();

        if faces.is_empty() || width == 0 || height == 0 {
            return Ok(PerturbOutcome {
                image: image.clone(),
                mask: GrayImage::new(width, height),
                decoys: Vec::new(),
            });
        }

        let mask = Self::build_mask(width, height, faces);
        let noisy = self.add_masked_noise(image, &mask, rng)?;
        let (signal, decoys) = self.decoy_signal(&mask, rng);

        let mut out = RgbImage::new(width, height);
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let decoy = signal.get_pixel(x, y)[0] as f64;
            for channel in 0..3 {
                let value = noisy[channel][[y as usize, x as usize]] + decoy;
                pixel[channel] = to_sample(value);
            }
        }

        debug!(
            "perturbed {} face(s), {} masked pixels, {} decoys",
            faces.len(),
            mask.pixels().filter(|p| p[0] == MASK_ON).count(),
            decoys.len()
        );

        Ok(PerturbOutcome {
            image: out,
            mask,
            decoys,
        })
    }

    pub fn build_mask(width: u32, height: u32, faces: &[FaceRegion]) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        if width == 0 || height == 0 {
            return mask;
        }

        for face in faces {
            for feature in FaceFeature::ALL {
                match open_polygon(face.feature_polygon(feature)).as_slice() {
                    [] => {}
                    [point] => plot_point(&mut mask, *point),
                    polygon => draw_polygon_mut(&mut mask, polygon, Luma([MASK_ON])),
                }
            }
        }

        mask
    }

    fn add_masked_noise<R: Rng + ?Sized>(
        &self,
        image: &RgbImage,
        mask: &GrayImage,
        rng: &mut R,
    ) -> Result<[Array2<f64>; 3]> {
        let (width, height) = image.dimensions();
        let shape = (height as usize, width as usize);
        let sigma = self.config.noise_ratio * self.config.max_sample;

        let mut planes = rgb_to_planes(image);
        for plane in planes.iter_mut() {
            let noise = gaussian_field(shape, sigma, rng)
                .map_err(|e| MarkError::Detection(format!("invalid face noise sigma {sigma}: {e}")))?;

            for ((y, x), value) in plane.indexed_iter_mut() {
                let weight = mask.get_pixel(x as u32, y as u32)[0] as f64 / MASK_ON as f64;
                *value += noise[[y, x]] * weight;
            }
        }

        Ok(planes)
    }

    /// Samples `decoy_count` candidates; only those landing outside the mask are drawn.
    fn decoy_signal<R: Rng + ?Sized>(
        &self,
        mask: &GrayImage,
        rng: &mut R,
    ) -> (ImageBuffer<Luma<f32>, Vec<f32>>, Vec<(u32, u32)>) {
        let (width, height) = mask.dimensions();
        let mut signal = ImageBuffer::<Luma<f32>, Vec<f32>>::new(width, height);
        let mut accepted = Vec::new();

        for _ in 0..self.config.decoy_count {
            let x = rng.gen_range(0..width);
            let y = rng.gen_range(0..height);

            if x < width && y < height && mask.get_pixel(x, y)[0] == 0 {
                draw_filled_circle_mut(
                    &mut signal,
                    (x as i32, y as i32),
                    self.config.decoy_radius,
                    Luma([self.config.decoy_intensity]),
                );
                accepted.push((x, y));
            }
        }

        (signal, accepted)
    }
}

impl Default for FacialRegionPerturber {
    fn default() -> Self {
        Self::new()
    }
}

/// Drops trailing points that repeat the first one; the polygon is closed implicitly.
fn open_polygon(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let mut polygon = points.to_vec();
    while polygon.len() > 1 && polygon.first() == polygon.last() {
        polygon.pop();
    }
    polygon
}

/// A feature collapsed to one pixel; `draw_polygon_mut` rejects single-point polygons.
fn plot_point(mask: &mut GrayImage, point: Point<i32>) {
    let (width, height) = mask.dimensions();
    if point.x >= 0 && point.y >= 0 && (point.x as u32) < width && (point.y as u32) < height {
        mask.put_pixel(point.x as u32, point.y as u32, Luma([MASK_ON]));
    }
}
