//! imgcache - client-side image resource cache.
//!
//! This crate negotiates the best image encoding the runtime decodes, adapts
//! quality to the network class, and keeps fetched variants in a bounded,
//! persistent cache with a per-slot binding for consumers.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer wiring the pipeline together.
pub mod application;
/// Domain layer containing entities, ports, and pure services.
pub mod domain;
/// Infrastructure layer containing adapters for external services.
pub mod infrastructure;
/// Presentation layer containing the slot binding and CLI commands.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "imgcache";
