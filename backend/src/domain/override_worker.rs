//! Fire-and-forget override submission worker.
//!
//! The orchestrator hands override jobs to a channel and returns
//! without waiting on the device; this worker drains the channel,
//! submits each override through the gateway and advances the owning
//! deployment to DEPLOYING or FAILED. Device-side confirmation arrives
//! later through `update_deployment`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::deployment::{DeploymentStatus, FailureOrigin};
use super::ports::{
    DeploymentRepository, DeviceConfigGateway, DispatchError, OverrideDispatcher, OverrideJob,
};

/// Dispatcher handing jobs to the in-process worker channel.
#[derive(Clone)]
pub struct ChannelOverrideDispatcher {
    jobs: mpsc::Sender<OverrideJob>,
}

impl ChannelOverrideDispatcher {
    /// Create a dispatcher and the receiver the worker will drain.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<OverrideJob>) {
        let (jobs, receiver) = mpsc::channel(buffer);
        (Self { jobs }, receiver)
    }
}

#[async_trait]
impl OverrideDispatcher for ChannelOverrideDispatcher {
    async fn dispatch(&self, job: OverrideJob) -> Result<(), DispatchError> {
        self.jobs
            .send(job)
            .await
            .map_err(|err| DispatchError::unavailable(err.to_string()))
    }
}

/// Worker submitting overrides and recording the outcome.
pub struct OverrideWorker {
    gateway: Arc<dyn DeviceConfigGateway>,
    deployments: Arc<dyn DeploymentRepository>,
}

impl OverrideWorker {
    pub fn new(
        gateway: Arc<dyn DeviceConfigGateway>,
        deployments: Arc<dyn DeploymentRepository>,
    ) -> Self {
        Self {
            gateway,
            deployments,
        }
    }

    /// Drain the channel until every dispatcher is dropped.
    pub async fn run(self, mut jobs: mpsc::Receiver<OverrideJob>) {
        while let Some(job) = jobs.recv().await {
            self.process(job).await;
        }
        info!("override worker channel closed, stopping");
    }

    /// Submit one override and record the result on its deployment.
    pub async fn process(&self, job: OverrideJob) {
        let deployment_id = job.deployment_id;
        let device_uid = job.submission.device_uid.clone();
        let submission = self.gateway.submit_override(job.submission).await;

        let deployment = match self.deployments.find_by_id(deployment_id).await {
            Ok(Some(deployment)) => deployment,
            Ok(None) => {
                warn!(%deployment_id, "deployment vanished before override outcome was recorded");
                return;
            }
            Err(repo_error) => {
                error!(%deployment_id, error = %repo_error, "cannot load deployment for override outcome");
                return;
            }
        };

        let mut deployment = deployment;
        let now = Utc::now();
        let transition = match submission {
            Ok(()) => {
                info!(%deployment_id, %device_uid, "override submitted, awaiting device confirmation");
                deployment.transition(DeploymentStatus::Deploying, now)
            }
            Err(gateway_error) => {
                warn!(%deployment_id, %device_uid, error = %gateway_error, "override submission failed");
                deployment.fail(FailureOrigin::Submission, gateway_error.to_string(), now)
            }
        };

        if let Err(transition_error) = transition {
            // A reaper or confirmation may have moved the record first;
            // log and leave the terminal status in place.
            warn!(%deployment_id, error = %transition_error, "override outcome ignored");
            return;
        }

        if let Err(repo_error) = self.deployments.update(deployment).await {
            error!(%deployment_id, error = %repo_error, "failed to persist override outcome");
        }
    }
}

#[cfg(test)]
#[path = "override_worker_tests.rs"]
mod tests;
