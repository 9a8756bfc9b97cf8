//! Interpreters for the text formats produced by the external tools.

pub mod dorks;
pub mod ffuf;
pub mod gnmap;
pub mod robots;

pub use gnmap::{RegexScanParser, ScanParser};
