mod auth;
mod error;
mod example;
pub mod model;
mod orchestrator;
mod ports;
mod prediction;
mod records;
mod registry;
mod spans;
mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::*;
pub use error::*;
pub use example::*;
pub use orchestrator::*;
pub use ports::*;
pub use prediction::*;
pub use records::*;
pub use registry::*;
pub use spans::*;
pub use types::*;
