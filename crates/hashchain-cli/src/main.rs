use anyhow::Result;
use clap::Parser;
use hashchain_core::{
    constants::DEFAULT_DIFFICULTY, Chain, ChainError, Payload, SharedChain, Strategy,
};
use serde::Serialize;
use std::str::FromStr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "hashchain")]
#[command(about = "Mine transfers into an in-memory hash chain and verify it")]
struct Cli {
    /// Leading zero hex digits required of every mined hash
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u32,

    /// Transfer to record, as FROM:TO:AMOUNT (repeatable)
    #[arg(long = "transfer", value_name = "FROM:TO:AMOUNT")]
    transfers: Vec<Transfer>,

    /// Search nonces on all cores
    #[arg(long)]
    parallel: bool,

    /// Print the chain as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Debug, PartialEq)]
struct Transfer {
    from: String,
    to: String,
    amount: f64,
}

impl FromStr for Transfer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (parties, amount) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected FROM:TO:AMOUNT, got '{s}'"))?;
        let (from, to) = parties
            .split_once(':')
            .ok_or_else(|| format!("expected FROM:TO:AMOUNT, got '{s}'"))?;
        if from.is_empty() || to.is_empty() {
            return Err("sender and recipient must not be empty".to_string());
        }
        let amount: f64 = amount
            .parse()
            .map_err(|e| format!("invalid amount '{amount}': {e}"))?;
        if !amount.is_finite() {
            return Err(format!("amount must be finite, got {amount}"));
        }
        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        })
    }
}

fn sample_transfers() -> Vec<Transfer> {
    vec![
        Transfer {
            from: "Alice".into(),
            to: "Bob".into(),
            amount: 5.0,
        },
        Transfer {
            from: "John".into(),
            to: "Bob".into(),
            amount: 2.0,
        },
    ]
}

#[derive(Serialize)]
struct Report<'a> {
    valid: bool,
    chain: &'a Chain,
}

fn print_chain(chain: &Chain) {
    println!("valid: {}", chain.is_valid());
    if let Some(violation) = chain.first_violation() {
        println!("violation: {violation}");
    }
    for record in chain.records() {
        println!("--------------------");
        println!("Data: {}", record.payload());
        println!("Hash: {}", record.hash());
        println!("Previous Hash: {}", record.previous_hash());
        println!("Timestamp: {}", record.timestamp());
        println!("Nonce: {}", record.nonce());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let transfers = if cli.transfers.is_empty() {
        sample_transfers()
    } else {
        cli.transfers
    };
    let strategy = if cli.parallel {
        Strategy::Parallel
    } else {
        Strategy::Sequential
    };

    let chain = SharedChain::new(Chain::new(cli.difficulty)?);
    let cancel = Arc::new(AtomicBool::new(false));

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling the current search");
                cancel.store(true, Ordering::Relaxed);
            }
        })
    };

    for transfer in transfers {
        let worker = {
            let chain = chain.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                let payload = Payload::transfer(&transfer.from, &transfer.to, transfer.amount);
                chain.append_with(payload, strategy, &cancel)
            })
        };
        match worker.await? {
            Ok(record) => info!(
                "Appended {} with nonce {}",
                record.payload(),
                record.nonce()
            ),
            Err(ChainError::MiningCancelled) => {
                warn!("Mining cancelled, keeping the records appended so far");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    interrupt.abort();

    let snapshot = chain.snapshot()?;
    if cli.json {
        let report = Report {
            valid: snapshot.is_valid(),
            chain: &snapshot,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_chain(&snapshot);
    }
    Ok(())
}
