//! Service layer: bundle selection, the parameter store and process
//! supervision.

pub mod bundle_selector;
pub mod parameter_store;
pub mod registry;
pub mod supervisor;

pub use bundle_selector::{select_bundle, select_bundle_for_header};
pub use parameter_store::{ComponentUpdate, ParameterStore};
pub use registry::{ConfiguredService, ServiceRegistry};
pub use supervisor::{ProcessStatus, ProcessTiming, ServiceProcess, ServiceSupervisor};
