//! Score Lookup - one-shot queries against the score sources
//!
//! Usage:
//!   score_lookup scores [ID]     latest score records, or one participant
//!   score_lookup ranking [ID]    aggregated ranking, or one participant's rank
//!   score_lookup revenues [ID]   revenue shares from the services host

use dotenv::dotenv;
use qubic_stats::config::StatsConfig;
use qubic_stats::render;
use qubic_stats::sources::doc_store::{find_score, rank_of};
use qubic_stats::sources::{MongoDocumentStore, ScoreRepository, SocketClient};
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("");
    let user_id = args.get(2).cloned().unwrap_or_default();

    let config = StatsConfig::from_env()?;

    match command {
        "scores" | "ranking" => {
            let store = Arc::new(
                MongoDocumentStore::connect(&config.mongo_uri, &config.mongo_db, config.connect_timeout).await?,
            );
            let repo = ScoreRepository::new(
                store,
                config.scores_collection.clone(),
                config.admin_scores_collection.clone(),
                config.read_timeout,
            );

            if command == "scores" {
                let scores = repo.latest_scores().await?;
                if user_id.is_empty() {
                    for entry in &scores {
                        println!("{}", render::score_line(entry));
                    }
                } else {
                    let entry = find_score(&scores, &user_id).ok_or("This ID could not be found")?;
                    println!("{}", render::score_line(entry));
                }
            } else {
                let scores = repo.admin_scores().await;
                if scores.is_empty() {
                    return Err("The data is missing".into());
                }
                if user_id.is_empty() {
                    println!("{}", render::ranking_lines(&scores));
                } else {
                    let (rank, entry) = rank_of(&scores, &user_id).ok_or("This ID could not be found")?;
                    println!("{}. {} - {}", rank, entry.id, entry.score);
                }
            }
        }
        "revenues" => {
            let client = SocketClient::new(config.revenues_addr(), config.connect_timeout, config.read_timeout);
            let shares = client.fetch_revenue_shares().await?;
            let selected: Vec<_> = shares
                .iter()
                .filter(|s| user_id.is_empty() || s.id == user_id)
                .collect();
            if selected.is_empty() {
                return Err("This ID could not be found".into());
            }
            for share in selected {
                println!("{} - {}%", share.id, share.revenue);
            }
        }
        _ => {
            eprintln!("usage: score_lookup <scores|ranking|revenues> [ID]");
            std::process::exit(2);
        }
    }

    Ok(())
}
