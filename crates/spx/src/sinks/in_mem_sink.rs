//! 🧪 A sink that lives entirely in RAM. For tests and dry runs, gone the moment you blink.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::common::{Record, RecordBatch};
use crate::sinks::Sink;

/// 📦 Hoards every batch it receives. Clone it before handing it to the runner and peek
/// inside afterwards; the `Arc` means both copies see the same Vec.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    received: Arc<Mutex<Vec<RecordBatch>>>,
    closed: Arc<Mutex<bool>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn batches(&self) -> Vec<RecordBatch> {
        self.received.lock().await.clone()
    }

    /// 🔍 Every record received so far, flattened in arrival order.
    pub async fn records(&self) -> Vec<Record> {
        self.received
            .lock()
            .await
            .iter()
            .flat_map(|b| b.records.iter().cloned())
            .collect()
    }

    pub async fn is_closed(&self) -> bool {
        *self.closed.lock().await
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn receive(&mut self, batch: RecordBatch) -> Result<()> {
        self.received.lock().await.push(batch);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        *self.closed.lock().await = true;
        Ok(())
    }
}
