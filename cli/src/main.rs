// Copyright (c) 2026 ILP Transport Contributors. MIT License.
// See LICENSE for details.

//! # ILP Command-Line Tool
//!
//! Entry point for the `ilp` binary. Parses CLI arguments, initializes
//! logging, and dispatches to a subcommand:
//!
//! - `secret`          generate a receiver secret
//! - `receiver-id`     derive the receiver id for a secret
//! - `psk-params`      derive a PSK destination and shared secret
//! - `create-packet`   build an IPR packet and condition
//! - `inspect`         decode a frame or IPR envelope
//! - `demo`            PSK2 payment over loopback plugins
//! - `version`         print build version information
//!
//! Results are printed to stdout as JSON.

mod cli;
mod logging;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::{json, Map, Value};

use ilp_transport::details::{parse_details, Headers};
use ilp_transport::encoding;
use ilp_transport::packet::{decode_ipr, Frame};
use ilp_transport::plugin::{LoopbackConfig, LoopbackPlugin, Plugin};
use ilp_transport::psk2::{self, PaymentOptions, Psk2Receiver, ReceiverOptions};
use ilp_transport::transport::ipr::{self, IprPacketParams};
use ilp_transport::transport::Receiver;

use cli::{Commands, CreatePacketArgs, DemoArgs, IlpCli, InspectArgs, PskParamsArgs, SecretArgs};
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = IlpCli::parse();
    logging::init_logging(&cli.log_level, LogFormat::from_str_lossy(&cli.log_format));

    let output = match cli.command {
        Commands::Secret => generate_secret(),
        Commands::ReceiverId(args) => receiver_id(args)?,
        Commands::PskParams(args) => psk_params(args)?,
        Commands::CreatePacket(args) => create_packet(args)?,
        Commands::Inspect(args) => inspect(args)?,
        Commands::Demo(args) => demo(args).await?,
        Commands::Version => {
            print_version();
            return Ok(());
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn decode_secret(text: &str, what: &str) -> Result<Vec<u8>> {
    encoding::decode(text.trim()).with_context(|| format!("{what} is not valid base64url"))
}

fn load_receiver(args: &SecretArgs) -> Result<Receiver> {
    let secret = decode_secret(&args.secret, "receiver secret")?;
    Receiver::new(&secret).context("invalid receiver secret")
}

fn headers_json(headers: &Headers) -> Value {
    let map: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect();
    Value::Object(map)
}

// ---------------------------------------------------------------------------
// Secrets & Addresses
// ---------------------------------------------------------------------------

fn generate_secret() -> Value {
    let receiver = Receiver::generate();
    json!({ "receiver_secret": encoding::encode(receiver.secret()) })
}

fn receiver_id(args: SecretArgs) -> Result<Value> {
    let receiver = load_receiver(&args)?;
    Ok(json!({ "receiver_id": receiver.receiver_id()? }))
}

fn psk_params(args: PskParamsArgs) -> Result<Value> {
    let receiver = load_receiver(&args.secret)?;
    let params = receiver.generate_psk_params(&args.account)?;
    Ok(json!({
        "destination_account": params.destination_account,
        "shared_secret": encoding::encode(params.shared_secret),
        "token": params.token,
    }))
}

// ---------------------------------------------------------------------------
// Packets
// ---------------------------------------------------------------------------

fn create_packet(args: CreatePacketArgs) -> Result<Value> {
    let secret = decode_secret(&args.secret.secret, "receiver secret")?;
    let expires_at = Utc::now() + chrono::Duration::seconds(args.expires_in);
    let created = ipr::create_packet_and_condition(&IprPacketParams {
        receiver_secret: secret,
        destination_account: args.account,
        destination_amount: args.amount,
        expires_at: Some(expires_at),
        data: args.data.into_bytes(),
        disable_encryption: args.disable_encryption,
        ..IprPacketParams::default()
    })
    .context("failed to create packet")?;

    let mut output = json!({
        "packet": hex::encode(&created.packet),
        "condition": encoding::encode(created.condition),
        "expires_at": ipr::format_expiry(&expires_at),
    });
    if args.envelope {
        output["ipr"] = Value::String(hex::encode(ipr::encode(&created.packet, &created.condition)));
    }
    Ok(output)
}

/// Find the shared secret for `account` by trying each address segment as
/// a receiver-id-prefixed local part.
fn shared_secret_for_account(receiver: &Receiver, account: &str) -> Result<Vec<u8>> {
    for segment in account.split('.') {
        if let Some(token) = receiver.match_local_part(segment)? {
            return Ok(receiver.shared_secret_for_token(token)?.to_vec());
        }
    }
    bail!("no address segment of {account} belongs to this receiver")
}

fn inspect(args: InspectArgs) -> Result<Value> {
    let bytes = hex::decode(args.hex.trim()).context("input is not hex")?;

    let (frame, condition) = match Frame::parse(&bytes) {
        Ok(frame) => (frame, None),
        Err(frame_err) => {
            let envelope = decode_ipr(&bytes)
                .map_err(|_| anyhow!("not a frame ({frame_err}) or an IPR envelope"))?;
            let frame = Frame::parse(&envelope.packet).context("IPR envelope carries a bad packet")?;
            (frame, Some(envelope.condition))
        }
    };

    let mut output = json!({ "kind": frame.kind() });
    if let Some(condition) = condition {
        output["condition"] = Value::String(encoding::encode(condition));
    }

    match frame {
        Frame::Payment(payment) => {
            output["account"] = Value::String(payment.account.clone());
            output["amount"] = Value::String(payment.amount.to_string());

            let secret = match (&args.receiver_secret, &args.shared_secret) {
                (Some(text), _) => {
                    let receiver = Receiver::new(&decode_secret(text, "receiver secret")?)?;
                    Some(shared_secret_for_account(&receiver, &payment.account)?)
                }
                (None, Some(text)) => Some(decode_secret(text, "shared secret")?),
                (None, None) => None,
            };
            match parse_details(&payment.data, secret.as_deref()) {
                Ok(details) => {
                    output["public_headers"] = headers_json(&details.public_headers);
                    output["headers"] = headers_json(&details.headers);
                    output["data"] = Value::String(String::from_utf8_lossy(&details.data).into_owned());
                }
                Err(err) => output["details_error"] = Value::String(err.to_string()),
            }
        }
        Frame::Prepare(prepare) => {
            output["amount"] = Value::String(prepare.amount.to_string());
            output["expires_at"] = Value::String(ipr::format_expiry(&prepare.expires_at));
            if let Some(condition) = prepare.execution_condition {
                output["execution_condition"] = Value::String(encoding::encode(condition));
            }
        }
        Frame::Reject(reject) => {
            output["code"] = Value::String(reject.code);
            output["triggered_by"] = Value::String(reject.triggered_by);
            output["message"] = Value::String(reject.message);
        }
        Frame::Fulfill(fulfill) => {
            output["fulfillment"] = Value::String(encoding::encode(fulfill.fulfillment));
        }
        Frame::QuoteBySourceRequest(request) => output["request"] = serde_json::to_value(request)?,
        Frame::QuoteBySourceResponse(response) => output["response"] = serde_json::to_value(response)?,
        Frame::QuoteByDestinationRequest(request) => output["request"] = serde_json::to_value(request)?,
        Frame::QuoteByDestinationResponse(response) => output["response"] = serde_json::to_value(response)?,
        Frame::QuoteLiquidityRequest(request) => output["request"] = serde_json::to_value(request)?,
        Frame::QuoteLiquidityResponse(response) => output["response"] = serde_json::to_value(response)?,
    }
    Ok(output)
}

// ---------------------------------------------------------------------------
// Demo
// ---------------------------------------------------------------------------

async fn demo(args: DemoArgs) -> Result<Value> {
    if args.rate_numerator == 0 || args.rate_denominator == 0 {
        bail!("rate numerator and denominator must be positive");
    }
    if args.max_packet_amount == Some(0) {
        bail!("max packet amount must be positive");
    }
    let config = LoopbackConfig {
        rate_numerator: args.rate_numerator,
        rate_denominator: args.rate_denominator,
        max_packet_amount: args.max_packet_amount,
        ..LoopbackConfig::default()
    };
    let (alice, bob) = LoopbackPlugin::pair("test.alice", "test.bob", config);
    alice.connect().await.context("failed to connect sender")?;
    alice.fail_next(args.fail_chunks);

    let secret = Receiver::generate().secret().to_vec();
    let receiver = Arc::new(Psk2Receiver::new(bob.address(), ReceiverOptions::new(secret.clone()))?);
    let listener = psk2::listen(bob, receiver).await?;

    let options = PaymentOptions::new("test.bob", secret);
    let result = if args.fixed_destination {
        psk2::send_destination_amount(alice.as_ref(), &options, args.amount).await
    } else {
        psk2::send_source_amount(alice.as_ref(), &options, args.amount).await
    };
    listener.stop();
    let result = result.context("payment failed")?;
    tracing::info!(chunks = result.chunks, "demo payment finished");

    Ok(json!({
        "payment": result,
        "frames_sent": alice.frames_sent(),
    }))
}

fn print_version() {
    println!("ilp {}", env!("CARGO_PKG_VERSION"));
    println!("  transport: ilp-transport {}", env!("CARGO_PKG_VERSION"));
    println!("  protocols: IPR, PSK/1.0, ILQP, PSK2");
}
