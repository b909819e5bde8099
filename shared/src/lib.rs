pub mod arguments;
pub mod maintenance;
pub mod tracing_setup;
