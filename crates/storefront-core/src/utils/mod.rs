//! Utility functions for formatting and display.

pub mod format;

pub use format::{format_age, format_price, truncate_string};
