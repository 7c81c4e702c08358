//! # CLI Interface
//!
//! Defines the command-line argument structure for `dropship` using `clap`
//! derive. Subcommands: `distribute`, `simulate`, `devnode`, `address`,
//! and `version`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use dropship_protocol::config::DispatchConfig;
use dropship_protocol::crypto::Address;
use dropship_protocol::transaction::Transfer;

/// Send the same transfer to every address in a list.
///
/// Each recipient gets its own signed transaction. Progress is streamed to
/// stdout; logs go to stderr.
#[derive(Parser, Debug)]
#[command(
    name = "dropship",
    about = "Batch distribution over a ledger node",
    version,
    propagate_version = true
)]
pub struct DropshipCli {
    /// Log output format: "pretty" or "json".
    #[arg(long, global = true, env = "DROPSHIP_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Distribute to a recipient list through a real node.
    Distribute(DistributeArgs),
    /// Run the same batch against an in-process ledger.
    Simulate(SimulateArgs),
    /// Serve an in-process ledger over JSON-RPC for local testing.
    Devnode(DevnodeArgs),
    /// Print the address belonging to a secret key.
    Address(AddressArgs),
    /// Print version information and exit.
    Version,
}

/// What to send, to whom, and how hard to try.
#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// File with one recipient address per line. Blank lines and `#`
    /// comments are ignored.
    #[arg(long, short = 'r')]
    pub recipients: PathBuf,

    /// Amount each recipient receives. For tokens this is in whole tokens
    /// unless `--raw-amount` is given.
    #[arg(long, short = 'a')]
    pub amount: u128,

    /// Token contract to distribute. Without it the ledger's native asset
    /// is sent.
    #[arg(long)]
    pub token: Option<Address>,

    /// Issue new supply through the token's `addToken` entry point instead
    /// of transferring from the sender's balance. The sender must be the
    /// token's minter.
    #[arg(long, requires = "token")]
    pub mint: bool,

    /// Send token amounts as given, without scaling by the token's decimals.
    #[arg(long)]
    pub raw_amount: bool,

    /// JSON file with supervisor, receipt and distributor settings.
    /// Flags below override it.
    #[arg(long, short = 'c', env = "DROPSHIP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Recipients processed concurrently.
    #[arg(long, env = "DROPSHIP_MAX_IN_FLIGHT")]
    pub max_in_flight: Option<usize>,

    /// Wait between finalization polls, in milliseconds.
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Give up waiting for a finalization record after this many polls.
    #[arg(long)]
    pub max_polls: Option<u32>,

    /// Give up on the node after this many consecutive failed attempts.
    #[arg(long)]
    pub max_reconnects: Option<u32>,

    /// Print events and the summary as JSON lines.
    #[arg(long)]
    pub json: bool,

    /// Write Prometheus metrics for the run to this file.
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

impl BatchArgs {
    pub fn transfer(&self) -> Transfer {
        match (self.token, self.mint) {
            (Some(contract), true) => Transfer::Mint {
                contract,
                amount: self.amount,
            },
            (Some(contract), false) => Transfer::Token {
                contract,
                amount: self.amount,
            },
            (None, _) => Transfer::Native { value: self.amount },
        }
    }

    /// Config file (if any) with command-line overrides applied.
    pub fn dispatch_config(&self) -> Result<DispatchConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                DispatchConfig::from_json(&text)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            None => DispatchConfig::default(),
        };

        if let Some(k) = self.max_in_flight {
            config.distributor.max_in_flight = k;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.receipt.poll_interval = Duration::from_millis(ms);
        }
        if self.max_polls.is_some() {
            config.receipt.max_polls = self.max_polls;
        }
        if self.max_reconnects.is_some() {
            config.supervisor.max_reconnect_attempts = self.max_reconnects;
        }
        if self.raw_amount {
            config.distributor.scale_by_decimals = false;
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct DistributeArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// JSON-RPC endpoint of the ledger node.
    #[arg(long, short = 'e', env = "DROPSHIP_ENDPOINT", default_value = "http://127.0.0.1:8545")]
    pub endpoint: String,

    /// Hex-encoded Ed25519 secret key of the sending account.
    #[arg(long, short = 'k', env = "DROPSHIP_KEY", hide_env_values = true)]
    pub key: String,

    /// Per-request timeout, in seconds.
    #[arg(long, default_value_t = 30)]
    pub request_timeout_secs: u64,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Sender key. A fresh key is generated when omitted.
    #[arg(long, short = 'k', env = "DROPSHIP_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Chain id of the simulated ledger.
    #[arg(long, default_value_t = 1)]
    pub chain_id: u64,

    /// Decimals of the simulated token contract.
    #[arg(long, default_value_t = 18)]
    pub token_decimals: u8,

    /// "Not found" answers before a record becomes visible.
    #[arg(long, default_value_t = 1)]
    pub finalize_after_polls: u32,

    /// Recipients whose transactions the ledger refuses.
    #[arg(long)]
    pub reject: Vec<Address>,

    /// Recipients whose transactions fail during execution.
    #[arg(long)]
    pub revert: Vec<Address>,
}

#[derive(Args, Debug)]
pub struct DevnodeArgs {
    /// Interface to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port for the JSON-RPC endpoint.
    #[arg(long, short = 'p', env = "DROPSHIP_DEVNODE_PORT", default_value_t = 8545)]
    pub port: u16,

    #[arg(long, default_value_t = 1)]
    pub chain_id: u64,

    /// Suggested fee unit price.
    #[arg(long, default_value_t = 1)]
    pub fee_unit_price: u128,

    /// Accounts to credit at startup. Repeat for several.
    #[arg(long)]
    pub fund: Vec<Address>,

    /// Native balance given to each funded account.
    #[arg(long, default_value_t = 1_000_000_000_000_000_000_000)]
    pub balance: u128,

    /// Deploy a token contract at this address. Funded accounts receive a
    /// token balance; the first one is also the token's minter.
    #[arg(long)]
    pub token: Option<Address>,

    #[arg(long, default_value_t = 18)]
    pub token_decimals: u8,

    /// "Not found" answers before a record becomes visible.
    #[arg(long, default_value_t = 1)]
    pub finalize_after_polls: u32,
}

#[derive(Args, Debug)]
pub struct AddressArgs {
    /// Hex-encoded secret key.
    #[arg(long, short = 'k', env = "DROPSHIP_KEY", hide_env_values = true, required_unless_present = "generate")]
    pub key: Option<String>,

    /// Generate a new key and print it with its address.
    #[arg(long, conflicts_with = "key")]
    pub generate: bool,
}
