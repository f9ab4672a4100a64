//! Test Scoring Client
//!
//! Generates PaySim-style transactions, sends them as NATS scoring requests
//! and logs each reply.
//!
//! Usage: test_scorer [nats_url] [subject] [count] [fraud_rate] [delay_ms]

use anyhow::Context;
use fraud_scoring_pipeline::types::{ScoreReply, TransactionRecord};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

/// Request generator for testing
struct RequestGenerator {
    rng: rand::rngs::ThreadRng,
}

impl RequestGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Small payment or deposit that leaves the balance roughly intact
    fn generate_legitimate(&mut self) -> TransactionRecord {
        let old_balance: f64 = self.rng.gen_range(0.0..50_000.0);
        let amount: f64 = self.rng.gen_range(1.0..2_000.0);
        let transaction_type = self.random_choice(&["PAYMENT", "CASH_IN", "DEBIT", "CASH_OUT"]);
        let new_balance = if transaction_type == "CASH_IN" {
            old_balance + amount
        } else {
            (old_balance - amount).max(0.0)
        };
        TransactionRecord::new(round2(amount), transaction_type, round2(old_balance), round2(new_balance))
    }

    /// Transfer or cash-out that drains the whole origin balance
    fn generate_suspicious(&mut self) -> TransactionRecord {
        let old_balance: f64 = self.rng.gen_range(10_000.0..1_000_000.0);
        let transaction_type = self.random_choice(&["TRANSFER", "CASH_OUT"]);
        TransactionRecord::new(round2(old_balance), transaction_type, round2(old_balance), 0.0)
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Share of suspicious requests; must be a probability.
fn parse_fraud_rate(raw: Option<&str>) -> anyhow::Result<f64> {
    let Some(raw) = raw else {
        return Ok(0.1);
    };
    let rate: f64 = raw
        .parse()
        .with_context(|| format!("Invalid fraud rate: {}", raw))?;
    if !(0.0..=1.0).contains(&rate) {
        anyhow::bail!("fraud rate must be within [0, 1], got {}", raw);
    }
    Ok(rate)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_scorer=info".parse()?),
        )
        .init();

    info!("Starting Test Scoring Client");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("fraud.score");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate = parse_fraud_rate(args.get(4).map(|s| s.as_str()))?;
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        fraud_rate = fraud_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, fraud_rate, delay_ms).await;
        }
    };

    let mut generator = RequestGenerator::new();
    let mut rng = rand::thread_rng();

    let mut sent_suspicious = 0u64;
    let mut flagged = 0u64;
    let mut failed = 0u64;

    for i in 0..count {
        let suspicious = rng.gen_bool(fraud_rate);
        let record = if suspicious {
            sent_suspicious += 1;
            generator.generate_suspicious()
        } else {
            generator.generate_legitimate()
        };

        let payload = serde_json::to_vec(&record)?;
        match client.request(subject.to_string(), payload.into()).await {
            Ok(message) => match serde_json::from_slice::<ScoreReply>(&message.payload) {
                Ok(ScoreReply::Scored(response)) => {
                    if response.is_fraudulent {
                        flagged += 1;
                    }
                    info!(
                        transaction_type = %record.transaction_type,
                        amount = record.amount,
                        suspicious = suspicious,
                        fraud_probability = response.fraud_probability,
                        is_fraudulent = response.is_fraudulent,
                        "Scored"
                    );
                }
                Ok(ScoreReply::Failed(error)) => {
                    failed += 1;
                    warn!(kind = %error.kind, error = %error.error, "Scoring failed");
                }
                Err(e) => {
                    failed += 1;
                    warn!(error = %e, "Unreadable reply");
                }
            },
            Err(e) => {
                failed += 1;
                warn!(error = %e, "Request failed");
            }
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Sent {}/{} requests ({} suspicious, {} flagged, {} failed)",
                i + 1,
                count,
                sent_suspicious,
                flagged,
                failed
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} requests ({} suspicious, {} flagged, {} failed)",
        count, sent_suspicious, flagged, failed
    );

    Ok(())
}

async fn run_dry_mode(count: u64, fraud_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = RequestGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let record = if rng.gen_bool(fraud_rate) {
            generator.generate_suspicious()
        } else {
            generator.generate_legitimate()
        };

        let json = serde_json::to_string_pretty(&record)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample request {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
