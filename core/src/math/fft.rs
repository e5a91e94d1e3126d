use num_complex::Complex32;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps the `rustfft` planner for reuse across blocks.
pub struct FftHelper {
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex32>,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex32::zero(); fft.get_inplace_scratch_len()];
        Self { fft, scratch }
    }

    /// Transform length the plan was built for.
    pub fn size(&self) -> usize {
        self.fft.len()
    }

    /// Unnormalised forward transform. Input shorter than the plan is zero padded,
    /// longer input is truncated.
    pub fn forward(&mut self, input: &[Complex32]) -> Vec<Complex32> {
        let size = self.fft.len();
        let mut buffer = Vec::with_capacity(size);
        buffer.extend_from_slice(&input[..input.len().min(size)]);
        buffer.resize(size, Complex32::zero());

        self.fft.process_with_scratch(&mut buffer, &mut self.scratch);
        buffer
    }

    /// Forward transform with the zero-frequency bin moved to the centre.
    pub fn forward_shifted(&mut self, input: &[Complex32]) -> Vec<Complex32> {
        let mut spectrum = self.forward(input);
        fft_shift(&mut spectrum);
        spectrum
    }
}

/// Rotates a spectrum so index 0 holds the most negative frequency.
pub fn fft_shift<T>(spectrum: &mut [T]) {
    let half = spectrum.len().div_ceil(2);
    spectrum.rotate_left(half);
}
