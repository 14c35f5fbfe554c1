pub use eddo_core::CoreError as ToolError;

pub type Result<T> = std::result::Result<T, ToolError>;
