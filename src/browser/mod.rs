pub mod actuator;
pub mod capture;
pub mod manager;

pub use actuator::CdpActuator;
pub use capture::CdpEventSource;
pub use manager::PageManager;
