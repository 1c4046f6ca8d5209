pub mod bytes;
pub mod file;

pub use bytes::*;
