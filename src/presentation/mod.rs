//! Presentation layer: the per-slot binding and CLI commands.

/// CLI command execution.
pub mod commands;
/// Per-slot cache binding.
pub mod image_slot;

pub use commands::execute;
pub use image_slot::{ImageSlot, SlotState};
