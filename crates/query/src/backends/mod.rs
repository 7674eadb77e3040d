//! Query executor backends.

pub mod postgres;
pub mod sqlite;
