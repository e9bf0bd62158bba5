//! Background audit writer.

use std::sync::Arc;

use chrono::Utc;
use domain::models::CreateAuditLogInput;
use domain::store::AuditStore;

/// Appends audit entries without blocking the caller.
#[derive(Clone)]
pub struct AuditWriter {
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Spawns the insert. Failures are logged and dropped.
    pub fn record(&self, entry: CreateAuditLogInput) {
        let store = self.store.clone();
        tokio::spawn(async move {
            let action = entry.action;
            if let Err(e) = store.insert(entry, Utc::now()).await {
                tracing::warn!(
                    action = %action.as_str(),
                    error = %e,
                    "Failed to write audit entry"
                );
            }
        });
    }
}
