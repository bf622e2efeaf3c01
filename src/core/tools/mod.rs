//! Tools the language model may call during a turn.

pub mod base;
pub mod registry;

pub use base::{Tool, ToolError, ToolExecutor, ToolOutput, ToolSpec};
pub use registry::{CurrentTimeTool, ToolRegistry};
