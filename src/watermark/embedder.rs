use image::RgbImage;
use log::debug;
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    codec::{DctCodec, StampConfig, TextStamp},
    error::{MarkError, Result},
    fingerprint::{ContentDigest, WatermarkPayload},
    image_utils::{all_finite, gaussian_field, planes_to_rgb, rgb_to_planes},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    pub max_offset: usize,
    pub offset_divisor: usize,
    pub strength: f64,
    /// Std-dev of the spatial dither pattern shared by all channels.
    pub dither_sigma: f64,
    /// Std-dev of the independent per-channel, per-pixel noise.
    pub noise_sigma: f64,
    pub payload_hex_chars: usize,
    pub backup_stamp: StampConfig,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            max_offset: 50,
            offset_divisor: 10,
            strength: 150.0,
            dither_sigma: 5.0,
            noise_sigma: 2.0,
            payload_hex_chars: 16,
            backup_stamp: StampConfig::default(),
        }
    }
}

pub struct PayloadEmbedder {
    config: EmbedConfig,
    codec: DctCodec,
}

impl PayloadEmbedder {
    pub fn new() -> Self {
        Self::with_config(EmbedConfig::default())
    }

    pub fn with_config(config: EmbedConfig) -> Self {
        Self {
            config,
            codec: DctCodec::new(),
        }
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    pub fn payload_for(&self, digest: &ContentDigest) -> WatermarkPayload {
        WatermarkPayload::from_digest(digest, self.config.payload_hex_chars)
    }

    /// Coefficient offset, shrunk for images smaller than `max_offset * offset_divisor`.
    pub fn offset(&self, height: usize, width: usize) -> usize {
        let divisor = self.config.offset_divisor.max(1);
        self.config.max_offset.min(height / divisor).min(width / divisor)
    }

    /// Scratch plane with `bit * strength` at each in-bounds payload coordinate.
    ///
    /// Bit `i` lands at `(i / width + k, i % width + k)`; bits past the plane edge are dropped.
    pub fn payload_plane(&self, height: usize, width: usize, payload: &WatermarkPayload) -> Array2<f64> {
        let mut plane = Array2::zeros((height, width));
        if height == 0 || width == 0 {
            return plane;
        }

        let k = self.offset(height, width);
        for (i, &bit) in payload.bits().iter().enumerate() {
            let (row, col) = (i / width + k, i % width + k);
            if row < height && col < width {
                plane[[row, col]] = bit as f64 * self.config.strength;
            }
        }

        plane
    }

    pub fn embed<R: Rng + ?Sized>(
        &self,
        image: &RgbImage,
        digest: &ContentDigest,
        rng: &mut R,
    ) -> Result<RgbImage> {
        let payload = self.payload_for(digest);
        self.embed_payload(image, &payload, digest, rng)
    }

    pub fn embed_payload<R: Rng + ?Sized>(
        &self,
        image: &RgbImage,
        payload: &WatermarkPayload,
        digest: &ContentDigest,
        rng: &mut R,
    ) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        let (height, width) = (height as usize, width as usize);
        if height == 0 || width == 0 {
            return Err(MarkError::Embed("image has no pixels".into()));
        }

        let mut planes = rgb_to_planes(image);
        self.codec.forward_planes(&mut planes);

        let watermark = self.payload_plane(height, width, payload);
        for plane in planes.iter_mut() {
            *plane += &watermark;
        }

        self.codec.inverse_planes(&mut planes);

        let dither = self.noise_field((height, width), self.config.dither_sigma, rng)?;
        for plane in planes.iter_mut() {
            let noise = self.noise_field((height, width), self.config.noise_sigma, rng)?;
            *plane += &dither;
            *plane += &noise;
        }

        if !all_finite(&planes) {
            return Err(MarkError::Embed(
                "non-finite sample after inverse transform".into(),
            ));
        }

        let mut marked = planes_to_rgb(&planes);
        TextStamp::apply(&mut marked, &self.config.backup_stamp);

        debug!(
            "embedded {} payload bits at offset {} for digest {}",
            payload.len(),
            self.offset(height, width),
            digest
        );

        Ok(marked)
    }

    fn noise_field<R: Rng + ?Sized>(
        &self,
        shape: (usize, usize),
        sigma: f64,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        gaussian_field(shape, sigma, rng)
            .map_err(|e| MarkError::Embed(format!("invalid noise sigma {sigma}: {e}")))
    }
}

impl Default for PayloadEmbedder {
    fn default() -> Self {
        Self::new()
    }
}
