//! Marks devices offline when their heartbeats stop.

use std::sync::Arc;
use std::time::Duration;

use super::scheduler::Job;
use crate::services::DeviceRegistry;

pub struct DeviceLivenessJob {
    registry: Arc<DeviceRegistry>,
    offline_after: chrono::Duration,
}

impl DeviceLivenessJob {
    pub fn new(registry: Arc<DeviceRegistry>, offline_after_secs: u64) -> Self {
        Self {
            registry,
            offline_after: chrono::Duration::seconds(offline_after_secs as i64),
        }
    }
}

#[async_trait::async_trait]
impl Job for DeviceLivenessJob {
    fn name(&self) -> &'static str {
        "device_liveness"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn execute(&self) -> Result<(), String> {
        self.registry
            .sweep_offline(self.offline_after)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
