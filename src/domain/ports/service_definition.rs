use async_trait::async_trait;

use crate::domain::errors::ProcessError;
use crate::domain::models::{ServiceProcessConfig, UmpireConfig};
use crate::domain::ports::ResourceStore;

/// A named Umpire service.
///
/// Implementations decide how many OS processes the service needs for a
/// given configuration; an empty list means the service has nothing to run.
#[async_trait]
pub trait ServiceDefinition: Send + Sync {
    fn name(&self) -> &str;

    async fn create_processes(
        &self,
        config: &UmpireConfig,
        resources: &dyn ResourceStore,
    ) -> Result<Vec<ServiceProcessConfig>, ProcessError>;
}
