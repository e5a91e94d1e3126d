pub mod detection;

pub use detection::Detection;
