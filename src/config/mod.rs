//! Configuration model for radorch.
//!
//! This module defines the Config struct that represents `<repo>/.radorch.yaml`.
//! The file is optional. Parsing is forward-compatible (unknown fields are
//! ignored), every field has a default, and values are validated after load.

mod model;
mod operations;
mod types;


pub use model::Config;
