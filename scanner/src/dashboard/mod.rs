//! Read-only HTTP view of the scanner: recent snapshots, the detection
//! folder, and the latest waterfall.

pub mod bridge;
pub mod model;

pub use bridge::DashboardBridge;
pub use model::WaterfallView;
