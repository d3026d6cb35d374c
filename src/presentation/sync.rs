//! Idempotent publish: reuse the item we posted before, create it only once

use super::{ItemId, MetricKey, OutputChannel, OutputItem};
use crate::errors::SyncError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// How many recent items are scanned for inline and attachment items
pub const INLINE_SCAN_LIMIT: usize = 200;
pub const ATTACHMENT_SCAN_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Edited(ItemId),
    Created(ItemId),
}

impl SyncOutcome {
    pub fn id(&self) -> ItemId {
        match self {
            SyncOutcome::Edited(id) | SyncOutcome::Created(id) => *id,
        }
    }
}

pub struct PresentationSync {
    channel: Arc<dyn OutputChannel>,
    /// Resolved item per key, kept for the process lifetime
    handles: Mutex<HashMap<MetricKey, ItemId>>,
}

impl PresentationSync {
    pub fn new(channel: Arc<dyn OutputChannel>) -> Self {
        Self {
            channel,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached(&self, key: MetricKey) -> Option<ItemId> {
        self.lock().get(&key).copied()
    }

    /// Make the item for `item.key` show `item`, creating it if needed
    ///
    /// 1. cached handle: edit
    /// 2. otherwise scan recent history for our item tagged with the key
    /// 3. found: cache and edit
    /// 4. not found: send and cache
    ///
    /// A handle whose item has vanished is dropped and the scan starts over.
    pub async fn publish(&self, item: &OutputItem) -> Result<SyncOutcome, SyncError> {
        let key = item.key;

        if let Some(id) = self.cached(key) {
            match self.channel.edit(id, item).await {
                Ok(()) => return Ok(SyncOutcome::Edited(id)),
                Err(SyncError::Conflict(_)) => {
                    log::warn!("⚠️  Cached {} item {} is gone, searching again", key, id);
                    self.forget(key);
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(id) = self.locate(key).await? {
            self.remember(key, id);
            match self.channel.edit(id, item).await {
                Ok(()) => return Ok(SyncOutcome::Edited(id)),
                Err(SyncError::Conflict(_)) => {
                    log::warn!("⚠️  {} item {} vanished while editing", key, id);
                    self.forget(key);
                }
                Err(e) => return Err(e),
            }
        }

        let id = self.channel.send(item).await?;
        self.remember(key, id);
        log::info!("🆕 Published new {} item {}", key, id);
        Ok(SyncOutcome::Created(id))
    }

    async fn locate(&self, key: MetricKey) -> Result<Option<ItemId>, SyncError> {
        let limit = if key.is_attachment() {
            ATTACHMENT_SCAN_LIMIT
        } else {
            INLINE_SCAN_LIMIT
        };

        let history = self.channel.history(limit).await?;
        Ok(history
            .into_iter()
            .find(|entry| entry.from_self && entry.tag == Some(key))
            .map(|entry| entry.id))
    }

    /// Best-effort removal of our previous items before the first cycle
    pub async fn cleanup(&self, limit: usize) {
        match self.channel.purge_own(limit).await {
            Ok(removed) => log::info!("🧹 Cleanup removed {} old items", removed),
            Err(e) => log::warn!("⚠️  Cleanup failed, continuing: {}", e),
        }
        self.lock().clear();
    }

    fn remember(&self, key: MetricKey, id: ItemId) {
        self.lock().insert(key, id);
    }

    fn forget(&self, key: MetricKey) {
        self.lock().remove(&key);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<MetricKey, ItemId>> {
        // The map stays consistent even if a holder panicked
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
