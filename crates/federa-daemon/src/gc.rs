// Copyright (c) 2026 Federa Contributors
// SPDX-License-Identifier: Apache-2.0

//! Background expiry collection.
//!
//! The collector runs with operator authority: no credentials are checked.
//! Each tick lists the sliver records and deletes the expired ones; the
//! owner-reference cascade takes the backing resources along. A failing
//! resource is logged and skipped so one bad record cannot wedge the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::store::{Kind, ObjectStore, StoreError};

pub struct Collector {
    store: Arc<dyn ObjectStore>,
    interval: Duration,
    timeout: Duration,
}

impl Collector {
    pub fn new(store: Arc<dyn ObjectStore>, interval: Duration, timeout: Duration) -> Self {
        Collector {
            store,
            interval,
            timeout,
        }
    }

    /// Runs forever; the first tick fires immediately.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(self.interval);
            loop {
                ticks.tick().await;
                self.collect().await;
            }
        })
    }

    /// One collection pass.
    pub async fn collect(&self) {
        let listed = tokio::time::timeout(self.timeout, self.store.list(Kind::Sliver, None))
            .await
            .unwrap_or(Err(StoreError::Timeout));
        let slivers = match listed {
            Ok(slivers) => slivers,
            Err(e) => {
                tracing::warn!(error = %e, "expiry collection skipped");
                return;
            }
        };
        let now = Utc::now();
        for object in slivers {
            let Some(spec) = object.as_sliver() else { continue };
            if spec.expires > now {
                continue;
            }
            let name = &object.meta.name;
            let deleted =
                tokio::time::timeout(self.timeout, self.store.delete(Kind::Sliver, name))
                    .await
                    .unwrap_or(Err(StoreError::Timeout));
            match deleted {
                Ok(()) | Err(StoreError::NotFound(..)) => {
                    tracing::info!(sliver = %name, expires = %spec.expires, "deleted expired sliver");
                }
                Err(e) => {
                    tracing::warn!(sliver = %name, error = %e, "failed to delete expired sliver");
                }
            }
        }
    }
}
