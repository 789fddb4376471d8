//! Real-bus transport over `tokio-serial`, feature-gated behind `serial`.
//!
//! Grounded on the `tokio-serial` dependency and `serial` cargo feature in
//! the teacher workspace's `daq-hardware` crate, and on the stable-address
//! philosophy of `daq-hardware/src/port_resolver.rs` (addresses here are
//! already-resolved port paths; resolving hardware IDs to paths is the
//! caller's job, out of scope for this transport).

use crate::{Address, Handle, Transport};
use async_trait::async_trait;
use seqlab_core::SeqError;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// A transport over real serial ports, one candidate baud rate and
/// terminator shared across every address it opens.
pub struct SerialTransport {
    baud_rate: u32,
    terminator: u8,
    timeout: Duration,
    ports: Mutex<HashMap<Address, SerialStream>>,
}

impl SerialTransport {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            terminator: b'\n',
            timeout: Duration::from_millis(500),
            ports: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn enumerate(&self) -> Result<Vec<Address>, SeqError> {
        let ports = tokio_serial::available_ports().map_err(|e| SeqError::TransportIo {
            address: "enumerate".into(),
            message: e.to_string(),
        })?;
        Ok(ports
            .into_iter()
            .map(|p| p.port_name)
            .filter(|a| !a.starts_with(crate::RESERVED_ADDRESS_PREFIX))
            .collect())
    }

    async fn open(&self, address: &Address) -> Result<Handle, SeqError> {
        let mut ports = self.ports.lock().await;
        if ports.contains_key(address) {
            return Err(SeqError::Unavailable {
                address: address.clone(),
            });
        }
        let stream = tokio_serial::new(address.clone(), self.baud_rate)
            .timeout(self.timeout)
            .open_native_async()
            .map_err(|e| SeqError::TransportIo {
                address: address.clone(),
                message: e.to_string(),
            })?;
        ports.insert(address.clone(), stream);
        Ok(Handle(address.clone()))
    }

    async fn query(&self, handle: &Handle, text: &str) -> Result<String, SeqError> {
        self.write(handle, text).await?;
        let mut ports = self.ports.lock().await;
        let stream = ports
            .get_mut(&handle.0)
            .ok_or_else(|| SeqError::TransportIo {
                address: handle.0.clone(),
                message: "handle not open".into(),
            })?;
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                return Err(SeqError::TransportTimeout {
                    address: handle.0.clone(),
                });
            }
            match tokio::time::timeout(self.timeout, stream.read_exact(&mut byte)).await {
                Ok(Ok(_)) => {
                    if byte[0] == self.terminator {
                        break;
                    }
                    buf.push(byte[0]);
                }
                Ok(Err(e)) => {
                    return Err(SeqError::TransportIo {
                        address: handle.0.clone(),
                        message: e.to_string(),
                    })
                }
                Err(_) => {
                    return Err(SeqError::TransportTimeout {
                        address: handle.0.clone(),
                    })
                }
            }
        }
        String::from_utf8(buf).map_err(|e| SeqError::TransportIo {
            address: handle.0.clone(),
            message: e.to_string(),
        })
    }

    async fn write(&self, handle: &Handle, text: &str) -> Result<(), SeqError> {
        let mut ports = self.ports.lock().await;
        let stream = ports
            .get_mut(&handle.0)
            .ok_or_else(|| SeqError::TransportIo {
                address: handle.0.clone(),
                message: "handle not open".into(),
            })?;
        let mut payload = text.as_bytes().to_vec();
        payload.push(self.terminator);
        stream
            .write_all(&payload)
            .await
            .map_err(|e| SeqError::TransportIo {
                address: handle.0.clone(),
                message: e.to_string(),
            })
    }

    async fn clear(&self, _handle: &Handle) -> Result<(), SeqError> {
        // Serial ports have no bus-level device clear; nothing to do.
        Ok(())
    }

    async fn close(&self, handle: &Handle) -> Result<(), SeqError> {
        let mut ports = self.ports.lock().await;
        ports.remove(&handle.0);
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
