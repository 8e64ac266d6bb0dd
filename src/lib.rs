pub mod api;
pub mod browser;
pub mod capture;
pub mod commands;
pub mod config;
pub mod dom;
pub mod error;
pub mod models;
pub mod playback;
pub mod schedule;
pub mod selector;
pub mod session;
pub mod store;

pub use error::{EngineError, Result};
