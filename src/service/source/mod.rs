pub mod fetcher;
pub mod source;

pub use fetcher::*;
pub use source::*;
