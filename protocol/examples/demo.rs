//! Walkthrough of the transport core over an in-process connector.
//!
//! Bob listens for IPR payments, Alice quotes and pays him, then sends a
//! larger amount as a PSK2 payment whose chunks adapt to connector failures.
//!
//! Run with:
//!   cargo run --example demo

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use ilp_transport::encoding;
use ilp_transport::ilqp::{self, QuoteParams};
use ilp_transport::packet::{Frame, OerPacket, Prepare};
use ilp_transport::plugin::{LoopbackConfig, LoopbackPlugin, Plugin};
use ilp_transport::psk2::{self, PaymentOptions, Psk2Receiver, ReceiverOptions};
use ilp_transport::transport::ipr::{self, IprPacketParams};
use ilp_transport::transport::{listen, review_callback, BoxError, ListenOptions, ListenSecret, Receiver};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";

fn step(n: u32, title: &str) {
    println!("\n{BOLD}{CYAN}[{n}]{RESET} {BOLD}{title}{RESET}");
}

fn detail(label: &str, value: impl std::fmt::Display) {
    println!("    {DIM}{label:<14}{RESET} {value}");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let config = LoopbackConfig {
        rate_numerator: 9,
        rate_denominator: 10,
        ..LoopbackConfig::default()
    };
    let (alice, bob) = LoopbackPlugin::pair("example.alice", "example.bob", config);
    alice.connect().await?;

    step(1, "Bob generates a receiver secret");
    let receiver = Receiver::generate();
    detail("receiver id", receiver.receiver_id()?);

    step(2, "Bob listens for IPR payments");
    let listener = listen(
        bob.clone(),
        ListenOptions::new(ListenSecret::Receiver(receiver.clone())),
        review_callback(|payment| async move {
            println!(
                "    {GREEN}✓{RESET} bob accepts {} for {:?}",
                payment.destination_amount,
                String::from_utf8_lossy(&payment.data)
            );
            Ok::<_, BoxError>(payment.fulfill())
        }),
    )
    .await?;

    step(3, "Alice quotes 1000 to Bob's ledger");
    let quote = ilqp::quote(
        alice.as_ref(),
        QuoteParams {
            destination_address: bob.address(),
            source_amount: Some(1_000),
            ..QuoteParams::default()
        },
    )
    .await?;
    detail("delivers", quote.destination_amount);
    detail("via", &quote.connector_account);

    step(4, "Bob issues a packet, Alice pays it");
    let packet = ipr::create_packet_and_condition(&IprPacketParams {
        receiver_secret: receiver.secret().to_vec(),
        destination_account: bob.address(),
        destination_amount: 900,
        data: b"coffee beans".to_vec(),
        ..IprPacketParams::default()
    })?;
    detail("condition", encoding::encode(packet.condition));
    let prepare = Prepare {
        amount: 1_000,
        expires_at: Utc::now() + chrono::Duration::seconds(30),
        execution_condition: Some(packet.condition),
        ilp: Some(packet.packet),
    };
    match Frame::parse(&alice.send_data(prepare.to_oer()?).await?)? {
        Frame::Fulfill(fulfill) => detail("fulfillment", encoding::encode(fulfill.fulfillment)),
        Frame::Reject(reject) => detail("rejected", format!("{} {}", reject.code, reject.message)),
        other => detail("unexpected", other.kind()),
    }
    listener.stop();

    step(5, "Alice sends 20000 as a PSK2 payment");
    let shared_secret = Receiver::generate().secret().to_vec();
    let psk2_receiver = Arc::new(Psk2Receiver::new(bob.address(), ReceiverOptions::new(shared_secret.clone()))?);
    let psk2_listener = psk2::listen(bob, psk2_receiver).await?;
    alice.fail_next(2);
    let result = psk2::send_source_amount(
        alice.as_ref(),
        &PaymentOptions::new("example.bob", shared_secret),
        20_000,
    )
    .await?;
    psk2_listener.stop();
    detail("sent", result.source_amount);
    detail("delivered", result.destination_amount);
    detail("chunks", result.chunks);

    println!("\n{BOLD}done{RESET} in {:?}", started.elapsed());
    Ok(())
}
