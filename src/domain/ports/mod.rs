//! Port trait definitions (Hexagonal Architecture)
//!
//! - ResourceStore: read access to content-addressed resources
//! - ServiceDefinition: turns a deployed config into process configs

pub mod resource_store;
pub mod service_definition;

pub use resource_store::ResourceStore;
pub use service_definition::ServiceDefinition;
