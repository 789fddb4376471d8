//! In-memory simulated bus, used by every test and by the CLI's `--mock`
//! mode. Grounded on the simulated-hardware pattern in
//! `daq-hardware/src/drivers/mock.rs` (realistic-but-deterministic stand-ins
//! for physical devices), adapted here to the text request/response shape
//! the spec's transport actually has instead of a typed trait-object device.

use crate::{Address, Handle, Transport, RESERVED_ADDRESS_PREFIX};
use async_trait::async_trait;
use seqlab_core::SeqError;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// One simulated instrument: an identity string plus a command/response
/// table the test wiring it up controls directly.
#[derive(Debug, Default, Clone)]
struct MockDevice {
    identity: String,
    /// Exact-match command -> response. `query`/`write` consult this; tests
    /// mutate it directly (e.g. to simulate a value changing after a write).
    responses: HashMap<String, String>,
    opened: bool,
    last_write: Option<String>,
}

/// A simulated bus: a bank of addressed devices plus per-handle open state.
#[derive(Default)]
pub struct MockTransport {
    devices: Mutex<HashMap<Address, MockDevice>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a simulated instrument at `address` answering `identity` to
    /// any identity probe (`*IDN?` or `ID`).
    pub async fn add_instrument(&self, address: &str, identity: &str) {
        let mut devices = self.devices.lock().await;
        devices.insert(
            address.to_string(),
            MockDevice {
                identity: identity.to_string(),
                responses: HashMap::new(),
                opened: false,
                last_write: None,
            },
        );
    }

    /// Program a fixed response for a given command on an already-registered
    /// address.
    pub async fn set_response(&self, address: &str, command: &str, response: &str) {
        let mut devices = self.devices.lock().await;
        if let Some(dev) = devices.get_mut(address) {
            dev.responses
                .insert(command.to_string(), response.to_string());
        }
    }

    /// The most recent `write`/`query` request text sent to `address`, for
    /// assertions in tests that exercise the write-coercion pipeline.
    pub async fn last_write(&self, address: &str) -> Option<String> {
        self.devices.lock().await.get(address)?.last_write.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn enumerate(&self) -> Result<Vec<Address>, SeqError> {
        let devices = self.devices.lock().await;
        let mut addrs: Vec<Address> = devices
            .keys()
            .filter(|a| !a.starts_with(RESERVED_ADDRESS_PREFIX))
            .cloned()
            .collect();
        addrs.sort();
        Ok(addrs)
    }

    async fn open(&self, address: &Address) -> Result<Handle, SeqError> {
        let mut devices = self.devices.lock().await;
        let dev = devices
            .get_mut(address)
            .ok_or_else(|| SeqError::TransportIo {
                address: address.clone(),
                message: "no such address".into(),
            })?;
        if dev.opened {
            return Err(SeqError::Unavailable {
                address: address.clone(),
            });
        }
        dev.opened = true;
        Ok(Handle(address.clone()))
    }

    async fn query(&self, handle: &Handle, text: &str) -> Result<String, SeqError> {
        let devices = self.devices.lock().await;
        let dev = devices
            .get(&handle.0)
            .ok_or_else(|| SeqError::TransportIo {
                address: handle.0.clone(),
                message: "handle not open".into(),
            })?;
        if text == "*IDN?" || text == "ID" {
            return Ok(dev.identity.clone());
        }
        dev.responses
            .get(text)
            .cloned()
            .ok_or_else(|| SeqError::TransportTimeout {
                address: handle.0.clone(),
            })
    }

    async fn write(&self, handle: &Handle, text: &str) -> Result<(), SeqError> {
        let mut devices = self.devices.lock().await;
        let dev = devices
            .get_mut(&handle.0)
            .ok_or_else(|| SeqError::TransportIo {
                address: handle.0.clone(),
                message: "handle not open".into(),
            })?;
        dev.last_write = Some(text.to_string());
        Ok(())
    }

    async fn clear(&self, _handle: &Handle) -> Result<(), SeqError> {
        Ok(())
    }

    async fn close(&self, handle: &Handle) -> Result<(), SeqError> {
        let mut devices = self.devices.lock().await;
        if let Some(dev) = devices.get_mut(&handle.0) {
            dev.opened = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_twice_is_unavailable() {
        let t = MockTransport::new();
        t.add_instrument("A", "DEMO,1,0,1").await;
        let _h = t.open(&"A".to_string()).await.unwrap();
        let second = t.open(&"A".to_string()).await;
        assert!(matches!(second, Err(SeqError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn query_unknown_command_times_out() {
        let t = MockTransport::new();
        t.add_instrument("A", "DEMO,1,0,1").await;
        let h = t.open(&"A".to_string()).await.unwrap();
        let r = t.query(&h, "BOGUS?").await;
        assert!(matches!(r, Err(SeqError::TransportTimeout { .. })));
    }
}
