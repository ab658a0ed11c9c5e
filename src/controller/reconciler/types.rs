//! # Reconciler Types
//!
//! The shared reconciler context handed to every pass, and the outcome a
//! pass reports back to the controller runtime.

use crate::config::ControllerConfig;
use crate::constants::CONTROLLER_NAME;
use crate::controller::events::{EventPublisher, KubeEventPublisher};
use crate::controller::resources::templates::TemplateError;
use crate::controller::resources::ManagedResources;
use crate::controller::store::{KubeStore, ObjectStore};
use kube::runtime::controller::Action;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;

/// Reconciler context, shared by all passes
///
/// Holds no per-instance state; the API server is the only state shared
/// between passes.
pub struct Reconciler {
    pub store: Arc<dyn ObjectStore>,
    pub events: Arc<dyn EventPublisher>,
    pub config: ControllerConfig,
    /// Templates decoded once at startup
    pub resources: ManagedResources,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        events: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            store,
            events,
            config,
            resources: ManagedResources::load()?,
        })
    }

    /// Reconciler talking to the cluster behind `client`
    pub fn from_client(client: Client, config: ControllerConfig) -> Result<Self, TemplateError> {
        Self::new(
            Arc::new(KubeStore::new(client.clone())),
            Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
            config,
        )
    }
}

/// Successful end of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Converged; wait for the next change
    Done,
    /// A transient failure was recorded in status; try again after the delay
    RequeueAfter(Duration),
}

impl From<Outcome> for Action {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => Action::await_change(),
            Outcome::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}
