//! # CLI Interface
//!
//! Defines the command-line argument structure for `ilp` using `clap`
//! derive. Secrets are accepted as unpadded base64url and may come from the
//! environment so they stay out of shell history.

use clap::{Parser, Subcommand};

/// Interledger transport tooling.
///
/// Generates receiver secrets, builds and inspects IPR/PSK packets, and runs
/// a PSK2 payment between two in-process loopback plugins.
#[derive(Parser, Debug)]
#[command(name = "ilp", about = "Interledger transport tooling", version, propagate_version = true)]
pub struct IlpCli {
    /// Default log filter when `RUST_LOG` is not set.
    #[arg(long, global = true, env = "ILP_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "ILP_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a fresh 32-byte receiver secret.
    Secret,
    /// Print the receiver id derived from a receiver secret.
    ReceiverId(SecretArgs),
    /// Derive a destination address and shared secret for a PSK sender.
    PskParams(PskParamsArgs),
    /// Build an IPR packet and its condition.
    CreatePacket(CreatePacketArgs),
    /// Decode a hex-encoded frame and, given a secret, open its details.
    Inspect(InspectArgs),
    /// Send a PSK2 payment across a loopback connector.
    Demo(DemoArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct SecretArgs {
    /// Receiver secret, base64url.
    #[arg(long, env = "ILP_RECEIVER_SECRET")]
    pub secret: String,
}

#[derive(Parser, Debug)]
pub struct PskParamsArgs {
    #[command(flatten)]
    pub secret: SecretArgs,

    /// The receiver's ledger account.
    #[arg(long, env = "ILP_ACCOUNT")]
    pub account: String,
}

#[derive(Parser, Debug)]
pub struct CreatePacketArgs {
    #[command(flatten)]
    pub secret: SecretArgs,

    /// The receiver's ledger account.
    #[arg(long, env = "ILP_ACCOUNT")]
    pub account: String,

    /// Destination amount.
    #[arg(long)]
    pub amount: u64,

    /// UTF-8 application data carried in the details.
    #[arg(long, default_value = "")]
    pub data: String,

    /// Seconds until the request expires.
    #[arg(long, default_value_t = 10)]
    pub expires_in: i64,

    /// Send details in the clear.
    #[arg(long)]
    pub disable_encryption: bool,

    /// Also print the IPR envelope.
    #[arg(long)]
    pub envelope: bool,
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Hex-encoded frame or IPR envelope.
    pub hex: String,

    /// Receiver secret (base64url) used to open IPR packet details.
    #[arg(long, env = "ILP_RECEIVER_SECRET", conflicts_with = "shared_secret")]
    pub receiver_secret: Option<String>,

    /// Shared secret (base64url) used to open PSK packet details.
    #[arg(long, env = "ILP_SHARED_SECRET")]
    pub shared_secret: Option<String>,
}

#[derive(Parser, Debug)]
pub struct DemoArgs {
    /// Amount to send.
    #[arg(long, default_value_t = 10_000)]
    pub amount: u64,

    /// Treat `amount` as the amount to deliver instead of the amount to send.
    #[arg(long)]
    pub fixed_destination: bool,

    /// Connector rate numerator.
    #[arg(long, default_value_t = 1)]
    pub rate_numerator: u64,

    /// Connector rate denominator.
    #[arg(long, default_value_t = 1)]
    pub rate_denominator: u64,

    /// Largest packet the connector forwards; bigger chunks get F08.
    #[arg(long)]
    pub max_packet_amount: Option<u64>,

    /// Number of chunks the connector fails with T04 before forwarding.
    #[arg(long, default_value_t = 0)]
    pub fail_chunks: u32,
}
