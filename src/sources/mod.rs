//! Data-fetch strategies for the three backends
//!
//! - `doc_store` - aggregation queries against the score database
//! - `tick_socket` - one-shot TCP reads from the services host
//! - `bus` - long-lived publish/subscribe feeds

pub mod backoff;
pub mod bus;
pub mod doc_store;
pub mod tick_socket;

pub use bus::{FeedHandler, MessageBus, NatsBus, RevenueFeed, ScoreFeed, TickFeed};
pub use doc_store::{DocumentStore, MongoDocumentStore, ScoreRepository};
pub use tick_socket::SocketClient;
