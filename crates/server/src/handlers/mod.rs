//! HTTP request handlers.

pub mod common;
pub mod health;
pub mod maps;
pub mod named;

pub use common::*;
pub use health::*;
pub use maps::*;
pub use named::*;
