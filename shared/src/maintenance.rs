use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;

/// A component with periodic upkeep to perform (e.g. the order-deadline reaper). Driven by an
/// external scheduler on a fixed interval; failures are logged and never abort the process.
#[async_trait::async_trait]
pub trait Maintaining: Send + Sync {
    async fn run_maintenance(&self) -> Result<()>;
}

/// Collects all service components requiring periodic maintenance.
pub struct ServiceMaintenance {
    pub maintainers: Vec<Arc<dyn Maintaining>>,
}

#[async_trait::async_trait]
impl Maintaining for ServiceMaintenance {
    async fn run_maintenance(&self) -> Result<()> {
        for result in join_all(self.maintainers.iter().map(|m| m.run_maintenance())).await {
            if let Err(err) = result {
                tracing::error!("maintenance task failed: {:?}", err);
            }
        }
        Ok(())
    }
}
