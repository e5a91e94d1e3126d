pub mod file;
pub mod sample;
pub mod source;

pub use file::IqFileSource;
pub use sample::{cu8_to_complex, Gain, SampleBlock, SourceSettings};
pub use source::SampleSource;
