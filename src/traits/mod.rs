//! Trait definitions for configuration objects.
//!
//! Each object type implements the traits it supports, encapsulating
//! API differences in the implementations.

mod audit;
mod get;
mod list;
mod update;

pub use audit::Audit;
pub use get::Get;
pub use list::{List, DEFAULT_PAGE_SIZE};
pub use update::Update;
