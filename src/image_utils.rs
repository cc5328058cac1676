use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal, NormalError};

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let lum =
            (0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64) as u8;
        gray.put_pixel(x, y, Luma([lum]));
    }

    gray
}

/// Splits an RGB buffer into three `height x width` float planes.
pub fn rgb_to_planes(image: &RgbImage) -> [Array2<f64>; 3] {
    let (width, height) = image.dimensions();
    let shape = (height as usize, width as usize);
    let mut planes = [Array2::zeros(shape), Array2::zeros(shape), Array2::zeros(shape)];

    for (x, y, pixel) in image.enumerate_pixels() {
        for (channel, plane) in planes.iter_mut().enumerate() {
            plane[[y as usize, x as usize]] = pixel[channel] as f64;
        }
    }

    planes
}

/// Rounds and clips float planes back into an 8-bit RGB buffer.
pub fn planes_to_rgb(planes: &[Array2<f64>; 3]) -> RgbImage {
    let (height, width) = planes[0].dim();
    let mut image = RgbImage::new(width as u32, height as u32);

    for y in 0..height {
        for x in 0..width {
            let px = Rgb([
                to_sample(planes[0][[y, x]]),
                to_sample(planes[1][[y, x]]),
                to_sample(planes[2][[y, x]]),
            ]);
            image.put_pixel(x as u32, y as u32, px);
        }
    }

    image
}

pub fn to_sample(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

pub fn all_finite(planes: &[Array2<f64>]) -> bool {
    planes.iter().all(|plane| plane.iter().all(|v| v.is_finite()))
}

/// Zero-mean Gaussian field; a zero sigma yields an all-zero field without drawing samples.
pub fn gaussian_field<R: Rng + ?Sized>(
    shape: (usize, usize),
    sigma: f64,
    rng: &mut R,
) -> Result<Array2<f64>, NormalError> {
    if sigma == 0.0 {
        return Ok(Array2::zeros(shape));
    }

    let normal = Normal::new(0.0, sigma)?;
    Ok(Array2::from_shape_simple_fn(shape, || normal.sample(rng)))
}
