//! Outbound request model and the network transport.
//!
//! Every request the coordinator intercepts is described by an
//! [`OutboundRequest`] and answered with a [`Response`], whether that
//! response came from the network, a store, or was synthesized locally.

mod client;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{HttpTransport, Transport};
pub use types::{OutboundRequest, Response};
