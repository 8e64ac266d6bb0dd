pub mod executor;

pub use executor::{Actuator, PageSnapshot, PlayOutcome, PlaybackProgress, PlaybackTiming, Player};
