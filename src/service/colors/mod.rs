pub mod cache;
pub mod service;

pub use cache::*;
pub use service::*;
