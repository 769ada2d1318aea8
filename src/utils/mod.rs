//! Helpers shared by log lines and status output.

/// Atomic unit formatting
pub mod index;

pub use index::{XMR_DECIMALS, format_token_amount};
