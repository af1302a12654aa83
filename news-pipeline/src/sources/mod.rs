pub mod builtin;
pub mod registry;

pub use builtin::default_sources;
pub use registry::SourceRegistry;
