//! Clases de componente de serie.
pub mod registry;

pub use registry::builtin_registry;
