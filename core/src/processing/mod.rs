pub mod detector;
pub mod downsample;
pub mod row;
pub mod spectrum;
pub mod waterfall;

pub use detector::{detect, SpikeDetector};
pub use downsample::{stride_sample, Downsampler};
pub use row::SpectrumRow;
pub use spectrum::{RawSpectrum, SpectrumTransformer};
pub use waterfall::{WaterfallBuffer, WaterfallSnapshot};
