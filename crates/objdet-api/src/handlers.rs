//! Request handlers.

pub mod files;
pub mod health;
pub mod pages;
pub mod upload;

pub use files::*;
pub use health::*;
pub use pages::*;
pub use upload::*;
