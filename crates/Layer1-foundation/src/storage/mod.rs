//! Storage module for taskbox
//!
//! - `json`: JSON - config file save/load

mod json;

pub use json::JsonStore;
