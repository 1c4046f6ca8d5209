pub mod media;
pub mod usage;
pub mod user;

pub use media::*;
pub use usage::*;
pub use user::*;
