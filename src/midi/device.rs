//! MIDI device abstraction
//!
//! The router never talks to hardware directly. It asks a [`MidiDevice`] to
//! make an input port ready, which may take time (permission prompts, driver
//! enumeration), so the answer is a future.
//!
//! [`VirtualMidiDevice`] is the in-process implementation used by the CLI and
//! the tests. Events are injected straight into the router.

use crate::error::{BridgeError, Result};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Future resolving once a port is ready (or known to be unavailable)
pub type PortFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// Source of MIDI input ports
pub trait MidiDevice: Send + Sync {
    /// Prepare `port` for input.
    ///
    /// Resolves to an error when the port does not exist. Listeners on such
    /// ports stay registered but never see events.
    fn open_port(&self, port: u8) -> PortFuture;

    /// Ports currently known to the device
    fn ports(&self) -> Vec<u8>;

    /// Human-readable device name
    fn name(&self) -> &str {
        "midi"
    }
}

/// In-process device with a configurable port list and open latency
#[derive(Debug, Clone)]
pub struct VirtualMidiDevice {
    ports: Arc<RwLock<BTreeSet<u8>>>,
    latency: Duration,
}

impl VirtualMidiDevice {
    pub fn new(ports: impl IntoIterator<Item = u8>) -> Self {
        Self {
            ports: Arc::new(RwLock::new(ports.into_iter().collect())),
            latency: Duration::ZERO,
        }
    }

    /// Delay every `open_port` by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn add_port(&self, port: u8) {
        if let Ok(mut ports) = self.ports.write() {
            ports.insert(port);
        }
    }

    pub fn remove_port(&self, port: u8) {
        if let Ok(mut ports) = self.ports.write() {
            ports.remove(&port);
        }
    }
}

impl Default for VirtualMidiDevice {
    fn default() -> Self {
        Self::new([0])
    }
}

impl MidiDevice for VirtualMidiDevice {
    fn open_port(&self, port: u8) -> PortFuture {
        let ports = Arc::clone(&self.ports);
        let latency = self.latency;

        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            let available = ports
                .read()
                .map_err(|_| BridgeError::Device("port table poisoned".to_string()))?
                .contains(&port);

            if available {
                Ok(())
            } else {
                Err(BridgeError::Device(format!("input port {} not available", port)))
            }
        })
    }

    fn ports(&self) -> Vec<u8> {
        self.ports
            .read()
            .map(|ports| ports.iter().copied().collect())
            .unwrap_or_default()
    }

    fn name(&self) -> &str {
        "virtual"
    }
}
