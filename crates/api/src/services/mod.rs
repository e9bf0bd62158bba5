//! Gateway engine services.

pub mod alerts;
pub mod audit;
pub mod automation;
pub mod bark;
pub mod batch;
pub mod device_client;
pub mod dispatcher;
pub mod ingest;
pub mod registry;

use std::sync::Arc;

use domain::services::{AlertNotifier, KeywordClassifier};
use domain::store::Stores;

pub use alerts::AlertSink;
pub use audit::AuditWriter;
pub use automation::{BatchSmsReceipt, SchedulerEngine, TaskRun};
pub use batch::BatchOrchestrator;
pub use device_client::{DeviceClient, HttpDeviceClient, MockDeviceClient, MockReply};
pub use dispatcher::{CommandDispatcher, DispatchOutcome, OutgoingSms};
pub use ingest::{Ack, EventIngestor};
pub use registry::DeviceRegistry;

use crate::config::Config;

/// The wired engine, shared by routes and background jobs.
#[derive(Clone)]
pub struct Services {
    pub registry: Arc<DeviceRegistry>,
    pub ingestor: Arc<EventIngestor>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub batches: Arc<BatchOrchestrator>,
    pub scheduler: Arc<SchedulerEngine>,
    pub alerts: Arc<AlertSink>,
    pub audit: AuditWriter,
}

impl Services {
    pub fn new(
        config: &Config,
        stores: Stores,
        client: Arc<dyn DeviceClient>,
        notifier: Arc<dyn AlertNotifier>,
    ) -> Self {
        let audit = AuditWriter::new(stores.audit.clone());

        let dispatcher = Arc::new(CommandDispatcher::new(
            stores.clone(),
            client,
            audit.clone(),
            &config.device,
        ));

        let alerts = Arc::new(AlertSink::new(
            stores.alerts.clone(),
            stores.devices.clone(),
            notifier,
            config.alerts.clone(),
        ));

        let registry = Arc::new(DeviceRegistry::new(
            stores.devices.clone(),
            dispatcher.clone(),
            audit.clone(),
        ));

        let ingestor = Arc::new(EventIngestor::new(
            stores.clone(),
            alerts.clone(),
            dispatcher.clone(),
            Arc::new(KeywordClassifier),
        ));

        let batches = Arc::new(BatchOrchestrator::new(
            stores.clone(),
            dispatcher.clone(),
            audit.clone(),
            config.batch.max_concurrency,
        ));

        let scheduler = Arc::new(SchedulerEngine::new(
            stores,
            dispatcher.clone(),
            batches.clone(),
            audit.clone(),
            &config.scheduler,
        ));

        Self {
            registry,
            ingestor,
            dispatcher,
            batches,
            scheduler,
            alerts,
            audit,
        }
    }
}
