pub mod flow;
pub mod selection;
pub mod step;

pub use flow::*;
pub use selection::*;
pub use step::*;
