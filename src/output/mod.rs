//! Scan result rendering
//!
//! Text output goes to the console for humans; JSON goes to a file for
//! downstream tooling.

pub mod json;
pub mod text;
