//! Application module
//!
//! Wires the validated settings into one worker per source and supervises
//! the workers until shutdown.

pub mod builder;
pub mod core;
pub mod services;
pub mod tasks;

pub use builder::ApplicationBuilder;
pub use core::Application;
pub use services::ApplicationServices;
