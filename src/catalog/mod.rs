//! Catalog of declared record types

mod registry;

pub use registry::TypeRegistry;
