pub mod models;
pub mod stats;
pub mod store;

pub use models::*;
pub use store::*;
