//! In-memory output channel that records every call

use super::{ChannelItem, ItemId, MetricKey, OutputChannel, OutputItem};
use crate::errors::SyncError;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub history: usize,
    pub sends: usize,
    pub edits: usize,
    pub deletes: usize,
}

#[derive(Debug, Clone)]
pub struct StoredItem {
    pub id: ItemId,
    pub from_self: bool,
    pub tag: Option<MetricKey>,
    pub content: Option<OutputItem>,
}

#[derive(Default)]
struct Inner {
    /// Oldest first
    items: Vec<StoredItem>,
    next_id: u64,
    calls: CallCounts,
    fail_purge: bool,
}

#[derive(Default)]
pub struct MemoryChannel {
    inner: Mutex<Inner>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn items(&self) -> Vec<StoredItem> {
        self.lock().items.clone()
    }

    /// Current content of our item tagged with `key`
    pub fn content_of(&self, key: MetricKey) -> Option<OutputItem> {
        self.lock()
            .items
            .iter()
            .rev()
            .find(|i| i.from_self && i.tag == Some(key))
            .and_then(|i| i.content.clone())
    }

    /// Add an item as if we had posted it in an earlier run
    pub fn seed_own(&self, key: MetricKey) -> ItemId {
        self.push(true, Some(key), None)
    }

    /// Add an item posted by someone else
    pub fn seed_foreign(&self, tag: Option<MetricKey>) -> ItemId {
        self.push(false, tag, None)
    }

    pub fn remove(&self, id: ItemId) {
        self.lock().items.retain(|i| i.id != id);
    }

    pub fn fail_purge(&self, fail: bool) {
        self.lock().fail_purge = fail;
    }

    fn push(&self, from_self: bool, tag: Option<MetricKey>, content: Option<OutputItem>) -> ItemId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = ItemId(inner.next_id);
        inner.items.push(StoredItem { id, from_self, tag, content });
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl OutputChannel for MemoryChannel {
    async fn history(&self, limit: usize) -> Result<Vec<ChannelItem>, SyncError> {
        let mut inner = self.lock();
        inner.calls.history += 1;
        Ok(inner
            .items
            .iter()
            .rev()
            .take(limit)
            .map(|i| ChannelItem {
                id: i.id,
                from_self: i.from_self,
                tag: i.tag,
            })
            .collect())
    }

    async fn send(&self, item: &OutputItem) -> Result<ItemId, SyncError> {
        self.lock().calls.sends += 1;
        Ok(self.push(true, Some(item.key), Some(item.clone())))
    }

    async fn edit(&self, id: ItemId, item: &OutputItem) -> Result<(), SyncError> {
        let mut inner = self.lock();
        inner.calls.edits += 1;
        match inner.items.iter_mut().find(|i| i.id == id) {
            Some(stored) => {
                stored.tag = Some(item.key);
                stored.content = Some(item.clone());
                Ok(())
            }
            None => Err(SyncError::Conflict(id.to_string())),
        }
    }

    async fn delete(&self, id: ItemId) -> Result<(), SyncError> {
        let mut inner = self.lock();
        inner.calls.deletes += 1;
        let before = inner.items.len();
        inner.items.retain(|i| i.id != id);
        if inner.items.len() == before {
            return Err(SyncError::Conflict(id.to_string()));
        }
        Ok(())
    }

    async fn purge_own(&self, limit: usize) -> Result<usize, SyncError> {
        let own: Vec<ItemId> = {
            let inner = self.lock();
            if inner.fail_purge {
                return Err(SyncError::Channel("purge not permitted".into()));
            }
            inner
                .items
                .iter()
                .rev()
                .take(limit)
                .filter(|i| i.from_self)
                .map(|i| i.id)
                .collect()
        };

        for id in &own {
            self.delete(*id).await?;
        }
        Ok(own.len())
    }
}
