//! # ILQP: Interledger Quoting
//!
//! Ask connectors what a payment will cost before sending it.
//!
//! [`quote`] picks the request variant from whichever amount is fixed:
//!
//! - source amount fixed → by-source request, compare destination amounts
//! - destination amount fixed → by-destination request, compare source amounts
//!
//! Destinations on the plugin's own ledger need no connector; the quote is
//! answered locally with equal amounts and nothing is sent. Otherwise every
//! known connector is asked concurrently and the cheapest answer wins.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_DESTINATION_EXPIRY};
use crate::packet::{
    Frame, OerPacket, QuoteByDestinationRequest, QuoteByDestinationResponse, QuoteBySourceRequest,
    QuoteBySourceResponse, QuoteLiquidityRequest, QuoteLiquidityResponse,
};
use crate::plugin::{safe_connect, Plugin};

mod error;

pub use error::IlqpError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Inputs to [`quote`].
#[derive(Debug, Clone)]
pub struct QuoteParams {
    /// Informational; defaults to the plugin address.
    pub source_address: Option<String>,
    pub destination_address: String,
    pub source_amount: Option<u64>,
    pub destination_amount: Option<u64>,
    /// How long the final transfer will be held at the destination.
    pub destination_expiry_duration: Duration,
    /// Bound on connecting and on each connector round trip.
    pub timeout: Duration,
    /// Connectors to ask. `None` means `plugin.connectors()`.
    pub connectors: Option<Vec<String>>,
}

impl Default for QuoteParams {
    fn default() -> Self {
        Self {
            source_address: None,
            destination_address: String::new(),
            source_amount: None,
            destination_amount: None,
            destination_expiry_duration: DEFAULT_DESTINATION_EXPIRY,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            connectors: None,
        }
    }
}

/// A priced route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub source_amount: u64,
    pub destination_amount: u64,
    /// Connector to send through, or the destination itself for local quotes.
    pub connector_account: String,
    /// How long the source transfer must be held.
    pub source_expiry_duration: Duration,
    pub expires_at: DateTime<Utc>,
}

/// What one quote request asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteQuery {
    Liquidity,
    BySource(u64),
    ByDestination(u64),
}

impl QuoteQuery {
    /// Which amount distinguishes two answers to this query.
    pub fn basis(self) -> QuoteBasis {
        match self {
            Self::Liquidity => QuoteBasis::Liquidity,
            Self::BySource(_) => QuoteBasis::DestinationAmount,
            Self::ByDestination(_) => QuoteBasis::SourceAmount,
        }
    }
}

/// How [`get_cheaper_quote`] compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteBasis {
    /// Smaller source amount is cheaper.
    SourceAmount,
    /// Larger destination amount is cheaper.
    DestinationAmount,
    /// No ordering; the later quote wins.
    Liquidity,
}

/// A connector's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteResponse {
    Liquidity(QuoteLiquidityResponse),
    BySource(QuoteBySourceResponse),
    ByDestination(QuoteByDestinationResponse),
}

impl QuoteResponse {
    pub fn source_hold_duration(&self) -> Duration {
        let millis = match self {
            Self::Liquidity(r) => r.source_hold_duration,
            Self::BySource(r) => r.source_hold_duration,
            Self::ByDestination(r) => r.source_hold_duration,
        };
        Duration::from_millis(millis as u64)
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

fn expiry_from_now(duration: Duration) -> DateTime<Utc> {
    let delta = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    Utc::now() + delta
}

/// One request/response exchange with `connector`.
pub async fn quote_by_connector(
    plugin: &dyn Plugin,
    connector: &str,
    destination_address: &str,
    query: QuoteQuery,
    destination_hold_duration: Duration,
    timeout: Duration,
) -> Result<QuoteResponse, IlqpError> {
    let destination_account = destination_address.to_string();
    let destination_hold_duration = millis(destination_hold_duration);
    let request = match query {
        QuoteQuery::Liquidity => QuoteLiquidityRequest {
            destination_account,
            destination_hold_duration,
        }
        .to_oer()?,
        QuoteQuery::BySource(source_amount) => QuoteBySourceRequest {
            destination_account,
            source_amount,
            destination_hold_duration,
        }
        .to_oer()?,
        QuoteQuery::ByDestination(destination_amount) => QuoteByDestinationRequest {
            destination_account,
            destination_amount,
            destination_hold_duration,
        }
        .to_oer()?,
    };

    debug!(%connector, destination = %destination_address, ?query, "requesting quote");
    let response = tokio::time::timeout(timeout, plugin.send_data_to(connector, request))
        .await
        .map_err(|_| IlqpError::QuoteTimeout(timeout))??;

    let frame = Frame::parse(&response)
        .map_err(|err| IlqpError::RemoteQuoteError(format!("unrecognised response: {err}")))?;
    match (query, frame) {
        (QuoteQuery::Liquidity, Frame::QuoteLiquidityResponse(r)) => Ok(QuoteResponse::Liquidity(r)),
        (QuoteQuery::BySource(_), Frame::QuoteBySourceResponse(r)) => Ok(QuoteResponse::BySource(r)),
        (QuoteQuery::ByDestination(_), Frame::QuoteByDestinationResponse(r)) => {
            Ok(QuoteResponse::ByDestination(r))
        }
        (_, Frame::Reject(reject)) => Err(IlqpError::RemoteQuoteError(format!(
            "{}: {}",
            reject.code, reject.message
        ))),
        (_, other) => Err(IlqpError::RemoteQuoteError(format!(
            "unexpected {} in response to quote",
            other.kind()
        ))),
    }
}

/// Pick the cheaper of two quotes. Ties go to `b`.
pub fn get_cheaper_quote(a: Quote, b: Quote, basis: QuoteBasis) -> Quote {
    match basis {
        QuoteBasis::SourceAmount if a.source_amount < b.source_amount => a,
        QuoteBasis::DestinationAmount if a.destination_amount > b.destination_amount => a,
        _ => b,
    }
}

/// Quote a payment.
pub async fn quote(plugin: &dyn Plugin, params: QuoteParams) -> Result<Quote, IlqpError> {
    let query = match (params.source_amount, params.destination_amount) {
        (Some(amount), None) => QuoteQuery::BySource(amount),
        (None, Some(amount)) => QuoteQuery::ByDestination(amount),
        _ => return Err(IlqpError::ExactlyOneAmount),
    };

    safe_connect(plugin, params.timeout).await?;

    if params.destination_address.starts_with(&plugin.ledger_prefix()) {
        let amount = match query {
            QuoteQuery::BySource(amount) | QuoteQuery::ByDestination(amount) => amount,
            QuoteQuery::Liquidity => 0,
        };
        debug!(destination = %params.destination_address, amount, "local quote");
        return Ok(Quote {
            source_amount: amount,
            destination_amount: amount,
            connector_account: params.destination_address,
            source_expiry_duration: params.destination_expiry_duration,
            expires_at: expiry_from_now(params.destination_expiry_duration),
        });
    }

    let connectors = params.connectors.clone().unwrap_or_else(|| plugin.connectors());
    if connectors.is_empty() {
        return Err(IlqpError::NoConnectors);
    }
    debug!(
        source = %params.source_address.clone().unwrap_or_else(|| plugin.address()),
        destination = %params.destination_address,
        connectors = connectors.len(),
        "quoting through connectors"
    );

    let responses = join_all(connectors.iter().map(|connector| {
        quote_by_connector(
            plugin,
            connector,
            &params.destination_address,
            query,
            params.destination_expiry_duration,
            params.timeout,
        )
    }))
    .await;

    let mut best: Option<Quote> = None;
    let mut first_error = None;
    for (connector, response) in connectors.iter().zip(responses) {
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(%connector, error = %err, "connector failed to quote");
                first_error.get_or_insert(err);
                continue;
            }
        };
        let source_expiry_duration = response.source_hold_duration();
        let (source_amount, destination_amount) = match (&response, query) {
            (QuoteResponse::BySource(r), QuoteQuery::BySource(source)) => (source, r.destination_amount),
            (QuoteResponse::ByDestination(r), QuoteQuery::ByDestination(destination)) => {
                (r.source_amount, destination)
            }
            _ => continue,
        };
        let candidate = Quote {
            source_amount,
            destination_amount,
            connector_account: connector.clone(),
            source_expiry_duration,
            expires_at: expiry_from_now(source_expiry_duration),
        };
        best = Some(match best {
            Some(current) => get_cheaper_quote(current, candidate, query.basis()),
            None => candidate,
        });
    }

    match (best, first_error) {
        (Some(quote), _) => Ok(quote),
        (None, Some(err)) => Err(err),
        (None, None) => Err(IlqpError::NoConnectors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote_of(source: u64, destination: u64, connector: &str) -> Quote {
        Quote {
            source_amount: source,
            destination_amount: destination,
            connector_account: connector.to_string(),
            source_expiry_duration: Duration::from_secs(1),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn cheaper_by_source_amount() {
        let a = quote_of(10, 5, "a");
        let b = quote_of(11, 5, "b");
        assert_eq!(get_cheaper_quote(a.clone(), b.clone(), QuoteBasis::SourceAmount).connector_account, "a");
        assert_eq!(get_cheaper_quote(b, a, QuoteBasis::SourceAmount).connector_account, "a");
    }

    #[test]
    fn cheaper_by_destination_amount() {
        let a = quote_of(10, 7, "a");
        let b = quote_of(10, 6, "b");
        assert_eq!(get_cheaper_quote(a.clone(), b.clone(), QuoteBasis::DestinationAmount).connector_account, "a");
        assert_eq!(get_cheaper_quote(b, a, QuoteBasis::DestinationAmount).connector_account, "a");
    }

    #[test]
    fn ties_and_liquidity_prefer_second() {
        let a = quote_of(10, 7, "a");
        let b = quote_of(10, 7, "b");
        assert_eq!(get_cheaper_quote(a.clone(), b.clone(), QuoteBasis::SourceAmount).connector_account, "b");
        assert_eq!(get_cheaper_quote(a.clone(), b.clone(), QuoteBasis::DestinationAmount).connector_account, "b");
        let cheap = quote_of(1, 100, "a");
        assert_eq!(get_cheaper_quote(cheap, b, QuoteBasis::Liquidity).connector_account, "b");
    }

    #[test]
    fn query_basis() {
        assert_eq!(QuoteQuery::BySource(1).basis(), QuoteBasis::DestinationAmount);
        assert_eq!(QuoteQuery::ByDestination(1).basis(), QuoteBasis::SourceAmount);
        assert_eq!(QuoteQuery::Liquidity.basis(), QuoteBasis::Liquidity);
    }

    #[test]
    fn plugin_timeout_maps_to_connection_timeout() {
        let err: IlqpError = crate::plugin::PluginError::ConnectionTimeout(Duration::from_secs(1)).into();
        assert_eq!(err, IlqpError::ConnectionTimeout(Duration::from_secs(1)));
        let err: IlqpError = crate::plugin::PluginError::NotConnected.into();
        assert!(matches!(err, IlqpError::Plugin(_)));
    }
}
