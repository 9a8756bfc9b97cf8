pub mod command;
pub mod runners;
pub mod toolchain;

pub use command::Invocation;
pub use runners::{ProcessRunner, ToolRunner};
