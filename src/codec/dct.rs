use std::{f64::consts::PI, sync::Arc};

use ndarray::{Array2, ArrayViewMut1, Axis};
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

struct Dct1d {
    len: usize,
    forward_fft: Arc<dyn Fft<f64>>,
    inverse_fft: Arc<dyn Fft<f64>>,
    /// `exp(-i*pi*k / 2N)` for each output frequency `k`.
    phase: Vec<Complex<f64>>,
    scale: Vec<f64>,
}

impl Dct1d {
    fn new(planner: &mut FftPlanner<f64>, len: usize) -> Self {
        let n = len as f64;
        let phase = (0..len)
            .map(|k| Complex::from_polar(1.0, -PI * k as f64 / (2.0 * n)))
            .collect();
        let scale = (0..len)
            .map(|k| if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() })
            .collect();

        Self {
            len,
            forward_fft: planner.plan_fft_forward(2 * len),
            inverse_fft: planner.plan_fft_inverse(2 * len),
            phase,
            scale,
        }
    }

    fn forward(&self, lane: &mut ArrayViewMut1<f64>, buffer: &mut [Complex<f64>]) {
        let n = self.len;
        for i in 0..n {
            let value = Complex::new(lane[i], 0.0);
            buffer[i] = value;
            buffer[2 * n - 1 - i] = value;
        }

        self.forward_fft.process(buffer);

        for k in 0..n {
            lane[k] = self.scale[k] * 0.5 * (self.phase[k] * buffer[k]).re;
        }
    }

    fn inverse(&self, lane: &mut ArrayViewMut1<f64>, buffer: &mut [Complex<f64>]) {
        let n = self.len;
        for k in 0..n {
            buffer[k] = self.phase[k].conj() * (self.scale[k] * lane[k]);
        }
        for slot in buffer[n..].iter_mut() {
            *slot = Complex::new(0.0, 0.0);
        }

        self.inverse_fft.process(buffer);

        for i in 0..n {
            lane[i] = buffer[i].re;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Inverse,
}

/// Orthonormal 2D DCT-II and its inverse; `inverse(forward(x)) == x` up to rounding.
#[derive(Debug, Default, Clone, Copy)]
pub struct DctCodec;

impl DctCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn forward(&self, channel: &Array2<f64>) -> Array2<f64> {
        let mut out = channel.clone();
        self.forward_in_place(&mut out);
        out
    }

    pub fn inverse(&self, coefficients: &Array2<f64>) -> Array2<f64> {
        let mut out = coefficients.clone();
        self.inverse_in_place(&mut out);
        out
    }

    pub fn forward_in_place(&self, plane: &mut Array2<f64>) {
        self.transform_2d(plane, Direction::Forward);
    }

    pub fn inverse_in_place(&self, plane: &mut Array2<f64>) {
        self.transform_2d(plane, Direction::Inverse);
    }

    /// Forward-transforms every colour plane; channels are independent and run in parallel.
    pub fn forward_planes(&self, planes: &mut [Array2<f64>]) {
        planes.par_iter_mut().for_each(|plane| self.forward_in_place(plane));
    }

    pub fn inverse_planes(&self, planes: &mut [Array2<f64>]) {
        planes.par_iter_mut().for_each(|plane| self.inverse_in_place(plane));
    }

    fn transform_2d(&self, plane: &mut Array2<f64>, direction: Direction) {
        let (height, width) = plane.dim();
        if height == 0 || width == 0 {
            return;
        }

        let mut planner = FftPlanner::new();
        let row_dct = Dct1d::new(&mut planner, width);
        let col_dct = Dct1d::new(&mut planner, height);

        // Rows are lanes along axis 1, columns are lanes along axis 0.
        Self::transform_lanes(plane, Axis(1), &row_dct, direction);
        Self::transform_lanes(plane, Axis(0), &col_dct, direction);
    }

    fn transform_lanes(plane: &mut Array2<f64>, axis: Axis, dct: &Dct1d, direction: Direction) {
        let mut buffer = vec![Complex::new(0.0, 0.0); 2 * dct.len];

        for mut lane in plane.lanes_mut(axis) {
            match direction {
                Direction::Forward => dct.forward(&mut lane, &mut buffer),
                Direction::Inverse => dct.inverse(&mut lane, &mut buffer),
            }
        }
    }
}
