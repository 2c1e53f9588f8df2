pub mod extractor;
pub mod validator;

pub use extractor::*;
pub use validator::*;
