//! Transfer Submit - feeds transfer requests into the outbound queue
//!
//! Reads one JSON object per line from stdin. Invalid lines are rejected
//! immediately; valid ones are queued and delivered one at a time. A burst
//! larger than the queue waits for room instead of being dropped.
//!
//! Usage:
//!   cat transfers.jsonl | cargo run --bin transfer_submit
//!
//! Environment variables (see `TransferConfig`):
//!   SERVICES_HOST / TRANSFER_PORT - Endpoint (default: 172.19.0.2:21847)
//!   CONNECT_TIMEOUT_SECS / WRITE_TIMEOUT_SECS - Per-delivery timeouts (default: 5)
//!   TRANSFER_QUEUE_CAPACITY - Queue size (default: 64)

use dotenv::dotenv;
use log::{error, info, warn};
use qubic_stats::transfer::{TransferQueue, TransferRequest};
use qubic_stats::TransferConfig;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = TransferConfig::from_env()?;
    info!("🚚 Submitting transfers to {}", config.transfer_addr());
    info!("   └─ Queue capacity: {}", config.queue_capacity);

    let (queue, worker) = TransferQueue::spawn(config.delivery(), config.queue_capacity);
    let mut receipts = Vec::new();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let submitted = match TransferRequest::parse(&line) {
            Ok(request) => queue.submit_wait(request).await,
            Err(e) => Err(e),
        };
        match submitted {
            Ok(receipt) => receipts.push((line_no, receipt)),
            Err(e) => warn!("⚠️  Line {} rejected: {}", line_no, e),
        }
    }

    let mut delivered = 0usize;
    let total = receipts.len();
    for (line_no, receipt) in receipts {
        match receipt.outcome().await {
            Ok(()) => delivered += 1,
            Err(e) => error!("❌ Line {} not delivered: {}", line_no, e),
        }
    }

    drop(queue);
    let _ = worker.await;

    info!("✅ {} of {} queued transfers delivered", delivered, total);
    Ok(())
}
