//! Document-store adapter for participant scores
//!
//! Two read paths:
//! - `admin_scores`: best score per participant, sorted descending. Feeds the
//!   min/max band and the ranking. Never fails, degrades to an empty list.
//! - `latest_scores`: most recent 5000 score records. Lookup path, errors
//!   are returned to the caller.

use crate::errors::SourceError;
use crate::snapshot::ParticipantScore;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{AggregateOptions, ClientOptions};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound of records read by the "all scores" path
pub const LATEST_SCORES_LIMIT: i64 = 5000;

#[derive(Debug, Clone)]
pub struct AggregateRequest {
    pub collection: String,
    pub pipeline: Vec<Document>,
    pub allow_disk_use: bool,
}

/// Anything able to run an aggregation pipeline against a named collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn aggregate(&self, request: AggregateRequest) -> Result<Vec<Document>, SourceError>;
}

/// Group by participant, keep the max-score record with its sibling fields,
/// sort by score descending
pub fn best_score_pipeline() -> Vec<Document> {
    vec![
        doc! {
            "$group": {
                "_id": "$id",
                "maxScore": {
                    "$max": {
                        "$mergeObjects": [ { "score": "$score" }, "$$ROOT" ]
                    }
                }
            }
        },
        doc! { "$replaceRoot": { "newRoot": "$maxScore" } },
        doc! { "$sort": { "score": -1 } },
    ]
}

pub fn latest_scores_pipeline() -> Vec<Document> {
    vec![
        doc! { "$sort": { "timestamp": -1 } },
        doc! { "$limit": LATEST_SCORES_LIMIT },
    ]
}

/// MongoDB-backed [`DocumentStore`]
pub struct MongoDocumentStore {
    db: mongodb::Database,
}

impl MongoDocumentStore {
    pub async fn connect(uri: &str, db_name: &str, connect_timeout: Duration) -> Result<Self, SourceError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| SourceError::Connect(format!("invalid document store uri: {}", e)))?;
        options.connect_timeout = Some(connect_timeout);
        options.server_selection_timeout = Some(connect_timeout);

        let client = mongodb::Client::with_options(options).map_err(classify)?;
        log::info!("🔗 Document store client ready (db: {})", db_name);

        Ok(Self {
            db: client.database(db_name),
        })
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn aggregate(&self, request: AggregateRequest) -> Result<Vec<Document>, SourceError> {
        let options = AggregateOptions::builder()
            .allow_disk_use(request.allow_disk_use)
            .build();

        let cursor = self
            .db
            .collection::<Document>(&request.collection)
            .aggregate(request.pipeline, options)
            .await
            .map_err(classify)?;

        cursor.try_collect().await.map_err(classify)
    }
}

fn classify(err: mongodb::error::Error) -> SourceError {
    match *err.kind {
        ErrorKind::BsonDeserialization(_) => SourceError::Decode(err.to_string()),
        _ => SourceError::Connect(err.to_string()),
    }
}

/// Score queries with the deadline and degradation policy applied
pub struct ScoreRepository {
    store: Arc<dyn DocumentStore>,
    scores_collection: String,
    admin_scores_collection: String,
    timeout: Duration,
}

impl ScoreRepository {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        scores_collection: impl Into<String>,
        admin_scores_collection: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            scores_collection: scores_collection.into(),
            admin_scores_collection: admin_scores_collection.into(),
            timeout,
        }
    }

    /// Best score per participant, highest first. Empty on any failure.
    pub async fn admin_scores(&self) -> Vec<ParticipantScore> {
        let request = AggregateRequest {
            collection: self.admin_scores_collection.clone(),
            pipeline: best_score_pipeline(),
            allow_disk_use: false,
        };

        match self.run(request).await {
            Ok(docs) => decode_scores(docs),
            Err(SourceError::ReadTimeout(_)) => {
                log::warn!("⚠️  admin_scores: Database connection time has expired");
                Vec::new()
            }
            Err(e) => {
                log::warn!("⚠️  admin_scores: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn latest_scores(&self) -> Result<Vec<ParticipantScore>, SourceError> {
        let request = AggregateRequest {
            collection: self.scores_collection.clone(),
            pipeline: latest_scores_pipeline(),
            allow_disk_use: true,
        };

        let docs = self.run(request).await?;
        Ok(decode_scores(docs))
    }

    async fn run(&self, request: AggregateRequest) -> Result<Vec<Document>, SourceError> {
        let collection = request.collection.clone();
        match tokio::time::timeout(self.timeout, self.store.aggregate(request)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::ReadTimeout(format!(
                "{} did not answer within {:?}",
                collection, self.timeout
            ))),
        }
    }
}

/// Convert raw records, skipping the ones without an id
pub fn decode_scores(docs: Vec<Document>) -> Vec<ParticipantScore> {
    docs.into_iter()
        .filter_map(|doc| {
            let id = match doc.get_str("id") {
                Ok(id) => id.to_string(),
                Err(e) => {
                    log::warn!("⚠️  Skipping score record without id: {}", e);
                    return None;
                }
            };

            Some(ParticipantScore {
                id,
                score: as_integer(doc.get("score")),
                timestamp: as_integer(doc.get("timestamp")),
            })
        })
        .collect()
}

fn as_integer(value: Option<&Bson>) -> i64 {
    match value {
        Some(Bson::Int32(v)) => *v as i64,
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        Some(Bson::DateTime(dt)) => dt.timestamp_millis() / 1000,
        _ => 0,
    }
}

/// First record with the given id
pub fn find_score<'a>(scores: &'a [ParticipantScore], id: &str) -> Option<&'a ParticipantScore> {
    scores.iter().find(|s| s.id == id)
}

/// 1-based rank of a participant in a descending score list
pub fn rank_of<'a>(scores: &'a [ParticipantScore], id: &str) -> Option<(usize, &'a ParticipantScore)> {
    scores
        .iter()
        .enumerate()
        .find(|(_, s)| s.id == id)
        .map(|(idx, s)| (idx + 1, s))
}
