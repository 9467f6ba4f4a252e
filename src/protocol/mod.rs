//! Wire protocol for the location hub
//!
//! One JSON object per WebSocket text frame, discriminated by its `type`
//! field. Inbound messages flow from clients to the hub, outbound messages
//! from the hub to clients.

pub mod codec;
mod coerce;
mod inbound;
mod outbound;

pub use codec::{decode, decode_outbound, encode, encode_inbound};
pub use inbound::{HistoryRequest, InboundMessage, SendLocation};
pub use outbound::OutboundMessage;
