//! C1 Transport: opaque synchronous text request/response over one bus
//! address (spec §4.1).
//!
//! The transport knows nothing about instrument models or parameters — it
//! only enumerates addresses and exchanges text with a handle. Everything
//! that interprets the text lives one layer up, in `seqlab-instruments`.

mod identity;
mod mock;
mod retry;

#[cfg(feature = "serial")]
mod serial;

pub use identity::identity_probe;
pub use mock::MockTransport;
pub use retry::{with_retries, RetryPolicy};
#[cfg(feature = "serial")]
pub use serial::SerialTransport;

use async_trait::async_trait;
use seqlab_core::SeqError;
use std::time::Duration;

/// A bus address, e.g. `GPIB0::12::INSTR` or `/dev/ttyUSB0`. Opaque to this
/// layer; only the transport implementation interprets its shape.
pub type Address = String;

/// Serial ports below this reserved prefix are hidden from `enumerate()`
/// (spec §4.1: "implementations may omit serial ports whose addresses begin
/// with a reserved tag").
pub const RESERVED_ADDRESS_PREFIX: &str = "LOOPBACK";

/// GPIB primary addresses above this value receive legacy `ID` instead of
/// `*IDN?` on identity probe (spec §4.1, "in source = 20").
pub const LEGACY_ID_THRESHOLD: u32 = 20;

/// An exclusively-held connection to one address, returned by `open()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(pub Address);

/// Opaque synchronous request/response bus transport.
///
/// Operations on one handle are serialised; operations on different handles
/// are independent (spec §4.1 ordering guarantee). Implementations are
/// blocking from the caller's point of view but expressed as `async fn` so
/// the runtime executor never ties up an OS thread waiting on a bus.
#[async_trait]
pub trait Transport: Send + Sync {
    /// All currently present addresses (minus any reserved-prefix ports).
    async fn enumerate(&self) -> Result<Vec<Address>, SeqError>;

    /// Acquire exclusive use of one address.
    async fn open(&self, address: &Address) -> Result<Handle, SeqError>;

    /// Write a request, then read a response up to the configured
    /// terminator.
    async fn query(&self, handle: &Handle, text: &str) -> Result<String, SeqError>;

    /// Write-only dispatch.
    async fn write(&self, handle: &Handle, text: &str) -> Result<(), SeqError>;

    /// Bus-level device clear.
    async fn clear(&self, handle: &Handle) -> Result<(), SeqError>;

    /// Release the handle.
    async fn close(&self, handle: &Handle) -> Result<(), SeqError>;

    /// Per-operation timeout this transport enforces.
    fn timeout(&self) -> Duration {
        Duration::from_secs(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enumerate_hides_reserved_prefix() {
        let t = MockTransport::new();
        t.add_instrument("GPIB0::1::INSTR", "DEMO,DMM-1000,0,1.0").await;
        t.add_instrument(&format!("{RESERVED_ADDRESS_PREFIX}::0"), "ignored").await;
        let addrs = t.enumerate().await.unwrap();
        assert_eq!(addrs, vec!["GPIB0::1::INSTR".to_string()]);
    }
}
