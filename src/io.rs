use std::{
    io::{BufWriter, Write},
    path::Path,
};

use image::{ColorType, ImageReader, RgbImage, codecs::jpeg::JpegEncoder};
use log::{debug, warn};
use tempfile::TempPath;

use crate::error::{MarkError, Result};

pub trait ImageLoader: Send + Sync {
    /// Decodes any supported container into 8-bit, 3-channel RGB.
    fn load(&self, path: &Path) -> Result<RgbImage>;
}

pub trait ImageWriter: Send + Sync {
    fn write(&self, image: &RgbImage, path: &Path) -> Result<()>;
}

/// Filesystem codec backed by the `image` crate; the output format follows the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileCodec;

impl ImageLoader for FileCodec {
    fn load(&self, path: &Path) -> Result<RgbImage> {
        let decode_err = |e: &dyn std::fmt::Display| MarkError::Decode(format!("{}: {e}", path.display()));

        let image = ImageReader::open(path)
            .map_err(|e| decode_err(&e))?
            .with_guessed_format()
            .map_err(|e| decode_err(&e))?
            .decode()
            .map_err(|e| decode_err(&e))?;

        if image.color() != ColorType::Rgb8 {
            debug!("converting {:?} image to RGB8", image.color());
        }

        Ok(image.to_rgb8())
    }
}

impl ImageWriter for FileCodec {
    fn write(&self, image: &RgbImage, path: &Path) -> Result<()> {
        image
            .save(path)
            .map_err(|e| MarkError::Write(format!("{}: {e}", path.display())))
    }
}

/// Decoded working buffer plus the on-disk normalized copy it was read back from.
///
/// The copy is deleted when this value is dropped or [`NormalizedImage::cleanup`] is called.
pub struct NormalizedImage {
    pub image: RgbImage,
    artifact: TempPath,
}

impl NormalizedImage {
    pub fn artifact_path(&self) -> &Path {
        &self.artifact
    }

    /// Removes the normalized copy, logging instead of failing if it is already gone.
    pub fn cleanup(self) -> RgbImage {
        let path = self.artifact.to_path_buf();
        if let Err(e) = self.artifact.close() {
            warn!("could not remove normalized copy {}: {e}", path.display());
        } else {
            debug!("removed normalized copy {}", path.display());
        }
        self.image
    }
}

/// Re-encodes the input as a JPEG normalized copy and decodes that copy back.
pub fn normalize(
    loader: &dyn ImageLoader,
    input: &Path,
    quality: u8,
    temp_dir: Option<&Path>,
) -> Result<NormalizedImage> {
    let decoded = loader.load(input)?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(".normalized-").suffix(".jpg");
    let file = match temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };

    {
        let mut writer = BufWriter::new(file.as_file());
        let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
        decoded.write_with_encoder(encoder)?;
        writer.flush()?;
    }

    let artifact = file.into_temp_path();
    debug!("normalized copy written to {}", artifact.display());

    let image = loader.load(&artifact)?;
    if image.dimensions() != decoded.dimensions() {
        return Err(MarkError::Decode(format!(
            "normalized copy is {:?}, source is {:?}",
            image.dimensions(),
            decoded.dimensions()
        )));
    }

    Ok(NormalizedImage { image, artifact })
}
