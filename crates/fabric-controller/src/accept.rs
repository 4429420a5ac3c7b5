//! Controller-side accept handling (spec §4.3): parse a router's hello
//! headers and bind it to its control channel.

use fabric_common::model::{normalize_group, Dialer, Listener};
use fabric_common::protocol::HelloHeaders;
use fabric_common::FabricError;
use tracing::{info, warn};

/// The parsed result of a hello exchange, ready to be applied to a
/// `RouterHandle`.
pub struct ParsedHello {
    pub version: Vec<u8>,
    pub listeners: Vec<Listener>,
    pub dialers: Vec<Dialer>,
}

/// Parses a router's hello headers.
///
/// Listener precedence (first match wins): the typed `ListenersHeader`,
/// then the legacy single-address `HelloRouterAdvertisementsHeader`
/// (protocol inferred from an address scheme prefix, default `"tls"`,
/// group `"default"`), then an empty set if neither is present.
/// Dialers are parsed independently of listeners.
///
/// Absence or malformed version is fatal (`InvalidHello`); the caller is
/// expected to close the control channel on that error. Everything else
/// degrades gracefully — a missing or undecodable advertisement header
/// continues with whatever was already parsed.
pub fn parse_hello(router_id: &str, headers: HelloHeaders) -> Result<ParsedHello, FabricError> {
    let version = headers.version.ok_or_else(|| {
        FabricError::InvalidHello(format!("{router_id}: missing HelloVersionHeader"))
    })?;

    let listeners = match headers.listeners {
        Some(listeners) => listeners
            .into_iter()
            .map(|l| Listener::new(l.address, l.protocol, l.group, l.cost_tags))
            .collect(),
        None => match headers.router_advertisement {
            Some(address) => {
                let protocol = infer_protocol_from_address(&address);
                vec![Listener::new(address, protocol, normalize_group(""), Default::default())]
            }
            None => {
                warn!(%router_id, "hello carried no listener advertisement; continuing with none");
                Vec::new()
            }
        },
    };

    let dialers = headers.dialers.unwrap_or_default();

    info!(
        %router_id,
        listeners = listeners.len(),
        dialers = dialers.len(),
        "parsed router hello"
    );

    Ok(ParsedHello {
        version,
        listeners,
        dialers,
    })
}

/// Infers a listener's protocol from a legacy address's scheme prefix
/// (`"tls:host:port"` → `"tls"`), defaulting to `"tls"` when the address
/// carries no recognizable scheme.
fn infer_protocol_from_address(address: &str) -> String {
    match address.split_once(':') {
        Some((scheme, _rest))
            if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            scheme.to_string()
        }
        _ => "tls".to_string(),
    }
}
