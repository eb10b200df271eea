use async_trait::async_trait;

use super::{Snapshot, StoreError, TelemetryStore};
use crate::models::{BackupRecord, OltHealth, OntDescription, PortProtectionRecord, PowerReading};
use crate::state::{new_shared, Shared};

/// Volatile store, used for dry runs and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Shared<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { tables: new_shared(Snapshot::default()) }
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn replace_power(&self, host: &str, records: Vec<PowerReading>) -> Result<(), StoreError> {
        self.tables.lock().replace_power(host, records)
    }

    async fn replace_descriptions(
        &self,
        host: &str,
        records: Vec<OntDescription>,
    ) -> Result<(), StoreError> {
        self.tables.lock().replace_descriptions(host, records)
    }

    async fn replace_port_protection(
        &self,
        host: &str,
        records: Vec<PortProtectionRecord>,
    ) -> Result<(), StoreError> {
        self.tables.lock().replace_port_protection(host, records)
    }

    async fn upsert_health(&self, record: OltHealth) -> Result<(), StoreError> {
        self.tables.lock().upsert_health(record);
        Ok(())
    }

    async fn append_backup(&self, record: BackupRecord) -> Result<(), StoreError> {
        self.tables.lock().append_backup(record);
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(self.tables.lock().clone())
    }
}
