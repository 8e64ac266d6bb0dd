pub mod recorder;

pub use recorder::{CapturedEvent, EventSource, Recorder};
