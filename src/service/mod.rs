pub mod colors;
pub mod extract;
pub mod source;
