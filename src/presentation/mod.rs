//! Output channel abstraction and the find-or-create-or-edit protocol
//!
//! Every item the engine publishes is tagged with a [`MetricKey`]. Inline items
//! carry the key's title, attachments are named `<key>_<unix-ts>.txt`. Channel
//! adapters surface the tag as a structured field of each history item so the
//! sync never has to look at message text.

use crate::errors::SyncError;
use async_trait::async_trait;

pub mod discord;
pub mod memory;
pub mod sync;

pub use sync::{PresentationSync, SyncOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKey {
    Tick,
    MinMax,
    Scores,
    Revenues,
    Ranking,
}

impl MetricKey {
    pub const ALL: [MetricKey; 5] = [
        MetricKey::Tick,
        MetricKey::MinMax,
        MetricKey::Scores,
        MetricKey::Revenues,
        MetricKey::Ranking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Tick => "tick",
            MetricKey::MinMax => "min-max",
            MetricKey::Scores => "scores",
            MetricKey::Revenues => "revenues",
            MetricKey::Ranking => "ranking",
        }
    }

    /// Title shown on inline items
    pub fn title(&self) -> &'static str {
        match self {
            MetricKey::Tick => "Tick",
            MetricKey::MinMax => "Scores",
            MetricKey::Scores => "Score list",
            MetricKey::Revenues => "Revenues",
            MetricKey::Ranking => "Ranking",
        }
    }

    /// Whether this key is published as a file attachment
    pub fn is_attachment(&self) -> bool {
        matches!(self, MetricKey::Scores | MetricKey::Revenues | MetricKey::Ranking)
    }

    pub fn from_title(title: &str) -> Option<MetricKey> {
        Self::ALL
            .into_iter()
            .find(|k| !k.is_attachment() && k.title() == title)
    }

    pub fn from_file_name(name: &str) -> Option<MetricKey> {
        Self::ALL.into_iter().find(|k| {
            k.is_attachment()
                && name
                    .strip_prefix(k.as_str())
                    .map_or(false, |rest| rest.starts_with('_'))
        })
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendering {
    /// Short summary shown as formatted text with a timestamp footer
    Inline {
        title: String,
        body: String,
        footer: String,
    },
    /// Full listing uploaded as a text file
    Attachment {
        file_name: String,
        content: String,
        caption: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputItem {
    pub key: MetricKey,
    pub rendering: Rendering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(pub u64);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the channel history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelItem {
    pub id: ItemId,
    /// Authored by this engine
    pub from_self: bool,
    pub tag: Option<MetricKey>,
}

/// Capabilities the engine needs from the chat front-end
#[async_trait]
pub trait OutputChannel: Send + Sync {
    /// Most recent items, newest first
    async fn history(&self, limit: usize) -> Result<Vec<ChannelItem>, SyncError>;

    async fn send(&self, item: &OutputItem) -> Result<ItemId, SyncError>;

    /// Replace the content of an existing item. `SyncError::Conflict` if it is gone.
    async fn edit(&self, id: ItemId, item: &OutputItem) -> Result<(), SyncError>;

    async fn delete(&self, id: ItemId) -> Result<(), SyncError>;

    /// Delete this engine's items among the most recent `limit`; returns how many
    async fn purge_own(&self, limit: usize) -> Result<usize, SyncError>;
}
