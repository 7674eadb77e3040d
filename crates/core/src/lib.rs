//! Core domain types and shared logic for the layergroup service.
//!
//! This crate defines the data model used across all other crates:
//! - Map configurations, layers and their option categories
//! - Layer option validation with layer-scoped errors
//! - Canonical normalization and fingerprinting
//! - Layergroup tokens
//! - Named templates and placeholder substitution

pub mod config;
pub mod error;
pub mod hash;
pub mod mapconfig;
pub mod normalize;
pub mod template;
pub mod token;
pub mod validation;

pub use error::{Error, Result};
pub use hash::Fingerprint;
pub use mapconfig::{
    AggregationOptions, AttributeSpec, Layer, LayerOption, LayerOptions, MapConfig,
};
pub use template::{NamedTemplate, Placeholder, PlaceholderType, TemplateAuth, TemplateError};
pub use token::LayergroupToken;
pub use validation::{LayerRef, ValidationError};
