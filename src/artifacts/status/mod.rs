//! HEAD, index and working tree compared
//!
//! - `file_change`: per-path change kinds and their short codes
//! - `inspector`: stat and content checks of a single path
//! - `status_info`: the collected report

pub mod file_change;
pub mod inspector;
pub mod status_info;
