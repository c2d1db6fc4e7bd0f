//! Data models for the App Forge backend.
//!
//! These models match the frontend interfaces for seamless interoperability.

mod app;
mod catalog;
mod datastore;
mod template;
mod version;

pub use app::*;
pub use catalog::*;
pub use datastore::*;
pub use template::*;
pub use version::*;
