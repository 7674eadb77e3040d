//! Common test utilities and fixtures.

pub mod doubles;
pub mod fixtures;
pub mod server;

#[allow(unused_imports)]
pub use doubles::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use server::*;
