//! canvas-bridge: command line driver
//!
//! Runs the bridge against the simulated engine without an editor attached:
//!
//! - `demo`: build a small MIDI -> machine -> viewer graph, feed it note
//!   events and print the resulting telemetry snapshot as JSON. With
//!   `--midi-device hardware` (feature `midi-io`) attached MIDI inputs are
//!   routed as well while the scheduler free-runs
//! - `commands`: show which palette commands a query matches
//! - `config`: print or write the default configuration

use anyhow::Context;
use canvas_bridge::commands;
use canvas_bridge::config::{default_config_path, LoggingSettings};
use canvas_bridge::midi::{ChannelFilter, InboundMidiEvent, MidiEventKind};
#[cfg(feature = "midi-io")]
use canvas_bridge::midi::MidirDevice;
use canvas_bridge::registry::{
    BlockConfig, MachineConfig, MidiInConfig, ValueViewConfig, VisualMode,
};
use canvas_bridge::{Bridge, BridgeConfig, Position, SimulatedEngine, Wire};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
#[cfg(feature = "midi-io")]
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Engine bridge and telemetry layer for the machine canvas
#[derive(Parser)]
#[command(name = "canvas-bridge")]
#[command(version)]
struct Cli {
    /// Configuration file (default: platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted session and print the telemetry snapshot
    Demo {
        /// Note-on events to feed through the MIDI router
        #[arg(short, long, default_value = "3")]
        events: u8,

        /// Free-run the scheduler for this many milliseconds afterwards
        #[arg(long, default_value = "0")]
        run_ms: u64,

        /// Where MIDI input comes from
        #[arg(long, value_enum, default_value_t = DeviceChoice::Virtual)]
        midi_device: DeviceChoice,
    },

    /// List palette commands matching a query
    Commands {
        /// Query text, e.g. "/osc"
        query: String,
    },

    /// Print the default configuration, or write it to a file
    Config {
        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DeviceChoice {
    /// In-process ports from the `[midi]` table
    Virtual,
    /// Attached inputs via midir, requires feature `midi-io`
    Hardware,
}

const DEMO_SOURCE: &str = "receive\nsend\nreceive\nadd\nsend\n";

fn init_logging(settings: &LoggingSettings) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    match &settings.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "canvas-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

fn demo_bridge(
    config: BridgeConfig,
    engine: SimulatedEngine,
    choice: DeviceChoice,
) -> anyhow::Result<Bridge> {
    match choice {
        DeviceChoice::Virtual => Ok(Bridge::with_virtual_midi(config, engine)),
        #[cfg(feature = "midi-io")]
        DeviceChoice::Hardware => {
            for (i, name) in MidirDevice::port_names().iter().enumerate() {
                tracing::info!("MIDI input {}: {}", i, name);
            }
            let (device, input) = MidirDevice::new();
            let bridge = Bridge::new(config, engine, Arc::new(device));
            // Detached: ends when the device closes its connections
            bridge.router().spawn_input_pump(input);
            Ok(bridge)
        }
        #[cfg(not(feature = "midi-io"))]
        DeviceChoice::Hardware => {
            anyhow::bail!("hardware MIDI needs a build with the `midi-io` feature")
        }
    }
}

async fn run_demo(
    config: BridgeConfig,
    events: u8,
    run_ms: u64,
    choice: DeviceChoice,
) -> anyhow::Result<()> {
    let engine = SimulatedEngine::new();
    let mut bridge = demo_bridge(config, engine.clone(), choice)?;

    let input = bridge
        .add_node_with(
            BlockConfig::MidiIn(MidiInConfig {
                on: MidiEventKind::NoteOn,
                port: 0,
                channels: ChannelFilter::from_channels([1]),
            }),
            Position::new(40.0, 40.0),
        )
        .context("engine refused the MIDI input block")?;
    let machine = bridge
        .add_node_with(
            BlockConfig::Machine(MachineConfig {
                source: DEMO_SOURCE.to_string(),
            }),
            Position::new(240.0, 40.0),
        )
        .context("engine refused the machine block")?;
    let viewer = bridge
        .add_node_with(
            BlockConfig::ValueView(ValueViewConfig {
                target: machine,
                offset: 0,
                size: 4,
                visual: VisualMode::Bytes,
            }),
            Position::new(440.0, 40.0),
        )
        .context("engine refused the value viewer")?;

    if !bridge.connect(Wire::new(input, 0, machine, 0)) {
        anyhow::bail!("engine refused to wire {} -> {}", input, machine);
    }
    bridge.engine().set_memory(machine, 0, &[0xCA, 0xFE]);

    // Let the device report port readiness before events arrive
    tokio::time::sleep(Duration::from_millis(10)).await;

    for i in 0..events {
        let note = 60u8.saturating_add(i);
        let delivered = bridge
            .router()
            .dispatch(&InboundMidiEvent::note_on(0, 1, note, 100));
        tracing::info!("Note {} delivered to {} listener(s)", note, delivered);
    }

    if run_ms > 0 {
        bridge.scheduler().start();
        tokio::time::sleep(Duration::from_millis(run_ms)).await;
        bridge.scheduler().stop();
    } else {
        bridge.scheduler().step_once();
    }

    if let Some(shown) = bridge.value_display(viewer) {
        tracing::info!("Viewer {}: {}", viewer, shown.summary());
    }

    let snapshot = bridge.telemetry().snapshot();
    let report = serde_json::json!({
        "graph": bridge.graph(),
        "telemetry": &*snapshot,
        "engine_commands": engine.commands().len(),
        "engine": bridge.engine().stats(),
        "router": bridge.router().stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    bridge.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = BridgeConfig::try_load(cli.config.as_deref());
    let config = loaded.as_ref().cloned().unwrap_or_default();
    let _guard = init_logging(&config.logging);

    tracing::info!("Starting canvas-bridge");
    if let Err(e) = &loaded {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }

    match cli.command {
        Commands::Demo {
            events,
            run_ms,
            midi_device,
        } => run_demo(config, events, run_ms, midi_device).await?,
        Commands::Commands { query } => {
            for command in commands::matches(&query) {
                println!("/{:<10} {}", command.prefix, command.name);
            }
        }
        Commands::Config { output } => match output {
            Some(path) => {
                config
                    .save(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Wrote {}", path.display());
            }
            None => {
                if let Some(path) = default_config_path() {
                    tracing::debug!("Default config location: {}", path.display());
                }
                print!("{}", toml::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_demo_defaults_to_virtual_device() {
        let cli = Cli::try_parse_from(["canvas-bridge", "demo"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Demo {
                events: 3,
                run_ms: 0,
                midi_device: DeviceChoice::Virtual,
            }
        ));
    }

    #[test]
    fn test_demo_accepts_hardware_device() {
        let cli =
            Cli::try_parse_from(["canvas-bridge", "demo", "--midi-device", "hardware"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Demo {
                midi_device: DeviceChoice::Hardware,
                ..
            }
        ));
    }

    #[cfg(not(feature = "midi-io"))]
    #[test]
    fn test_hardware_device_needs_feature() {
        let err = demo_bridge(
            BridgeConfig::default(),
            SimulatedEngine::new(),
            DeviceChoice::Hardware,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("midi-io"));
    }

    #[tokio::test]
    async fn test_demo_runs_on_virtual_device() {
        run_demo(BridgeConfig::default(), 2, 0, DeviceChoice::Virtual)
            .await
            .unwrap();
    }
}
