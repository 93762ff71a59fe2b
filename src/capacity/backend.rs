//! The pluggable capacity backend: a narrow `list/create/destroy` interface against
//! whatever provisions session-runner processes. A concrete hypervisor-backed
//! implementation is a separate collaborator outside this core; only the in-memory fake
//! used by tests and by the in-process demo deployment lives here.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::RunnerStatus;

#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("capacity backend unavailable: {0}")]
    Unavailable(String),
}

pub type CapacityResult<T> = Result<T, CapacityError>;

#[async_trait]
pub trait CapacityBackend: Send + Sync {
    async fn list(&self) -> CapacityResult<Vec<RunnerStatus>>;
    async fn create(&self, id: &str) -> CapacityResult<()>;
    async fn destroy(&self, id: &str) -> CapacityResult<()>;
}

/// In-memory fake: every `create`d ID is immediately reported healthy by `list`. No
/// process is actually spawned — exercising the capacity provider's policy in tests
/// doesn't require a real hypervisor collaborator.
#[derive(Default)]
pub struct InMemoryCapacityBackend {
    runners: Mutex<HashMap<String, bool>>,
}

impl InMemoryCapacityBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CapacityBackend for InMemoryCapacityBackend {
    async fn list(&self) -> CapacityResult<Vec<RunnerStatus>> {
        let runners = self.runners.lock().expect("capacity backend mutex poisoned");
        Ok(runners
            .iter()
            .map(|(id, healthy)| RunnerStatus {
                id: id.clone(),
                healthy: *healthy,
            })
            .collect())
    }

    async fn create(&self, id: &str) -> CapacityResult<()> {
        self.runners
            .lock()
            .expect("capacity backend mutex poisoned")
            .insert(id.to_string(), true);
        Ok(())
    }

    async fn destroy(&self, id: &str) -> CapacityResult<()> {
        self.runners
            .lock()
            .expect("capacity backend mutex poisoned")
            .remove(id);
        Ok(())
    }
}
