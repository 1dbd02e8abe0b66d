//! Local block storage for the monitor.
//!
//! The monitor keeps only a bounded window of recent blocks in memory
//! ([`window::WindowStore`]); nothing is persisted.

pub mod window;

pub use window::{WindowError, WindowStore};
