//! Filesystem helpers.
//!
//! Failure logs and run state are rewritten in place, so every write goes
//! through [`atomic_write_file`]: a reader sees either the old or the new
//! content, never a torn file.

mod atomic;

pub use atomic::atomic_write_file;
