// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`MessengerFactory`] that opens sessions on the bridge sidecar.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use courier_core::{CourierError, MessengerFactory, OpenedSession};

use crate::client::BridgeClient;
use crate::session::BridgeSession;

const EVENT_CAPACITY: usize = 256;

/// Opens one sidecar session per account store path.
#[derive(Debug, Clone)]
pub struct BridgeFactory {
    client: BridgeClient,
}

impl BridgeFactory {
    /// `timeout` bounds every HTTP command sent to the sidecar.
    pub fn new(bridge_url: &str, timeout: Duration) -> Result<Self, CourierError> {
        Ok(Self {
            client: BridgeClient::new(bridge_url, timeout)?,
        })
    }
}

#[async_trait]
impl MessengerFactory for BridgeFactory {
    async fn open(&self, store: &Path) -> Result<OpenedSession, CourierError> {
        let store = store.to_string_lossy();
        let opened = self.client.open(&store).await?;
        info!(
            key = %opened.key,
            store = %store,
            paired = opened.device_identity,
            "bridge session opened"
        );

        let (tx, events) = mpsc::channel(EVENT_CAPACITY);
        let session = Arc::new(BridgeSession::new(self.client.clone(), &opened, tx));
        Ok(OpenedSession { session, events })
    }
}
