//! Single-consumer transfer queue
//!
//! Producers call [`TransferQueue::submit`]; exactly one worker owns the
//! receiving side, so at most one submission is in flight and requests leave
//! in the order they were accepted.

use super::{TransferError, TransferRequest};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct Job {
    request: TransferRequest,
    done: oneshot::Sender<Result<(), TransferError>>,
}

/// Handle to await the delivery outcome of one submission
pub struct TransferReceipt {
    rx: oneshot::Receiver<Result<(), TransferError>>,
}

impl TransferReceipt {
    pub async fn outcome(self) -> Result<(), TransferError> {
        self.rx.await.unwrap_or(Err(TransferError::QueueClosed))
    }
}

#[derive(Clone)]
pub struct TransferQueue {
    tx: mpsc::Sender<Job>,
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub addr: String,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

impl TransferQueue {
    /// Start the worker and return the producer handle
    pub fn spawn(config: DeliveryConfig, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(rx, config));
        (Self { tx }, worker)
    }

    /// Validate and enqueue without waiting for delivery
    pub fn submit(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError> {
        request.validate()?;

        let (done, rx) = oneshot::channel();
        self.tx
            .try_send(Job { request, done })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransferError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => TransferError::QueueClosed,
            })?;

        Ok(TransferReceipt { rx })
    }

    pub fn submit_json(&self, raw: &str) -> Result<TransferReceipt, TransferError> {
        self.submit(TransferRequest::parse(raw)?)
    }

    /// Validate, then wait for room in the queue instead of failing with `QueueFull`
    pub async fn submit_wait(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError> {
        request.validate()?;

        let (done, rx) = oneshot::channel();
        self.tx
            .send(Job { request, done })
            .await
            .map_err(|_| TransferError::QueueClosed)?;

        Ok(TransferReceipt { rx })
    }
}

async fn run_worker(mut rx: mpsc::Receiver<Job>, config: DeliveryConfig) {
    log::info!("🚚 Transfer worker started (endpoint: {})", config.addr);

    while let Some(job) = rx.recv().await {
        log::info!("📤 Sending transfer (queued behind it: {})", rx.len());

        let result = deliver(&config, &job.request).await;
        match &result {
            Ok(()) => log::info!("✅ Transfer was sent (tick {})", job.request.tick),
            Err(e) => log::error!("❌ Transfer failed: {}", e),
        }

        // Submitter may have dropped its receipt
        let _ = job.done.send(result);
    }

    log::info!("🚚 Transfer worker stopped");
}

/// One connection, then close
///
/// The endpoint reads a JSON array; each connection carries one request.
async fn deliver(config: &DeliveryConfig, request: &TransferRequest) -> Result<(), TransferError> {
    let body = serde_json::to_vec(std::slice::from_ref(request)).map_err(|e| TransferError::Write(e.to_string()))?;

    let mut stream = match timeout(config.connect_timeout, TcpStream::connect(&config.addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(TransferError::Connect(format!("{}: {}", config.addr, e))),
        Err(_) => {
            return Err(TransferError::Connect(format!(
                "{}: no connection within {:?}",
                config.addr, config.connect_timeout
            )))
        }
    };

    let write = async {
        stream.write_all(&body).await?;
        stream.flush().await?;
        stream.shutdown().await
    };

    match timeout(config.write_timeout, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TransferError::Write(e.to_string())),
        Err(_) => Err(TransferError::Write(format!(
            "not written within {:?}",
            config.write_timeout
        ))),
    }
}
