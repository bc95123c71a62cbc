//! Hardware MIDI input via `midir`
//!
//! Connections are owned by a dedicated thread; [`MidirDevice::open_port`]
//! asks that thread to connect and resolves when it answers. Incoming bytes
//! are forwarded as [`RawMidiInput`] on a crossbeam channel, which
//! [`MidiRouter::spawn_input_pump`](crate::midi::MidiRouter::spawn_input_pump)
//! drains into the router. Port numbers are midir port indices.

use crate::error::{BridgeError, Result};
use crate::midi::device::{MidiDevice, PortFuture};
use crate::midi::router::RawMidiInput;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use midir::{MidiInput, MidiInputConnection};
use std::collections::HashMap;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;

const CLIENT_NAME: &str = "canvas-bridge";

enum DeviceCommand {
    Open {
        port: u8,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// `midir`-backed [`MidiDevice`]
pub struct MidirDevice {
    commands: Sender<DeviceCommand>,
    thread: Option<JoinHandle<()>>,
}

impl MidirDevice {
    /// Start the connection thread; the receiver yields every incoming message
    pub fn new() -> (Self, Receiver<RawMidiInput>) {
        let (command_tx, command_rx) = unbounded();
        let (input_tx, input_rx) = unbounded();

        let thread = std::thread::spawn(move || connection_thread(command_rx, input_tx));

        (
            Self {
                commands: command_tx,
                thread: Some(thread),
            },
            input_rx,
        )
    }

    /// Names of the currently attached input ports, by index
    pub fn port_names() -> Vec<String> {
        let Ok(input) = MidiInput::new(CLIENT_NAME) else {
            return Vec::new();
        };
        input
            .ports()
            .iter()
            .enumerate()
            .map(|(i, port)| {
                input
                    .port_name(port)
                    .unwrap_or_else(|_| format!("Port {}", i))
            })
            .collect()
    }
}

impl MidiDevice for MidirDevice {
    fn open_port(&self, port: u8) -> PortFuture {
        let (reply, answer) = oneshot::channel();
        let sent = self.commands.send(DeviceCommand::Open { port, reply });

        Box::pin(async move {
            sent.map_err(|_| BridgeError::Channel("MIDI thread not running".to_string()))?;
            answer
                .await
                .map_err(|_| BridgeError::Channel("MIDI thread dropped request".to_string()))?
        })
    }

    fn ports(&self) -> Vec<u8> {
        (0..Self::port_names().len())
            .filter_map(|i| u8::try_from(i).ok())
            .collect()
    }

    fn name(&self) -> &str {
        "midir"
    }
}

impl Drop for MidirDevice {
    fn drop(&mut self) {
        let _ = self.commands.send(DeviceCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn connection_thread(commands: Receiver<DeviceCommand>, input: Sender<RawMidiInput>) {
    let mut connections: HashMap<u8, MidiInputConnection<()>> = HashMap::new();

    loop {
        match commands.recv_timeout(Duration::from_millis(100)) {
            Ok(DeviceCommand::Open { port, reply }) => {
                let result = if connections.contains_key(&port) {
                    Ok(())
                } else {
                    connect(port, input.clone()).map(|conn| {
                        connections.insert(port, conn);
                    })
                };
                let _ = reply.send(result);
            }
            Ok(DeviceCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    tracing::debug!("Closing {} MIDI connection(s)", connections.len());
}

fn connect(port: u8, input: Sender<RawMidiInput>) -> Result<MidiInputConnection<()>> {
    let midi_input = MidiInput::new(CLIENT_NAME)
        .map_err(|e| BridgeError::Device(format!("Failed to create MIDI input: {}", e)))?;

    let ports = midi_input.ports();
    let midi_port = ports
        .get(port as usize)
        .ok_or_else(|| BridgeError::Device(format!("MIDI input port {} not found", port)))?;

    let name = midi_input
        .port_name(midi_port)
        .unwrap_or_else(|_| format!("Port {}", port));

    let connection = midi_input
        .connect(
            midi_port,
            CLIENT_NAME,
            move |_timestamp, bytes, _| {
                let _ = input.send(RawMidiInput {
                    port,
                    bytes: bytes.to_vec(),
                });
            },
            (),
        )
        .map_err(|e| BridgeError::Device(format!("Failed to connect to {}: {}", name, e)))?;

    tracing::info!("Connected MIDI input {} ({})", port, name);
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    #[tokio::test]
    async fn test_missing_port_is_device_error() {
        let (device, _input) = MidirDevice::new();
        let result = device.open_port(200).await;
        assert!(matches!(result, Err(BridgeError::Device(_))));
        assert!(!device.ports().contains(&200));
    }

    #[test]
    fn test_drop_joins_connection_thread() {
        let (device, input) = MidirDevice::new();
        drop(device);
        // The thread owned the only sender
        assert!(input.recv().is_err());
    }
}
