pub mod builtin;
pub mod registry;

pub use builtin::declared::DeclaredTool;
pub use builtin::function::FnTool;
pub use registry::ToolRegistry;
