pub mod dispatcher;
pub mod sink;

pub use dispatcher::{DetectionDispatcher, DrainReport};
pub use sink::{DetectionEvent, EventSink};
