//! Repository traits for metadata operations.

pub mod mapconfigs;
pub mod templates;

pub use mapconfigs::MapConfigRepo;
pub use templates::TemplateRepo;
