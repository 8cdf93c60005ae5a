mod config;
mod connection;
mod history;
mod prefs;
mod remote;
mod transport;

use anyhow::{Context, Result};
use blueremote_shared::{DeviceId, RemoteCommand};
use clap::Parser;
use config::{AppConfig, TransportMode};
use connection::{LinkEvent, SerialLinkManager};
use history::MessageHistory;
use prefs::PreferenceStore;
use remote::{parse_input, RemoteInput, ReservedButtons, HELP};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Bluetooth serial remote control for a paired car
#[derive(Debug, Parser)]
#[command(name = "blueremote", version)]
struct Cli {
    /// Device address to connect to (defaults to the last connected device)
    device: Option<String>,

    /// Config file (defaults to <config dir>/blueremote/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Talk to the peripheral simulator at this address instead of Bluetooth
    #[arg(long, value_name = "ADDR")]
    tcp: Option<String>,

    /// Preference file holding the last connected device
    #[arg(long)]
    prefs: Option<PathBuf>,
}

/// What the input loop does after a line
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Everything the prompt acts on
struct Remote {
    manager: SerialLinkManager,
    config: AppConfig,
    prefs: PreferenceStore,
    history: MessageHistory,
    reserved: ReservedButtons,
    /// Device of the most recent connect request, for `reconnect`
    target: Option<DeviceId>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(address) = cli.tcp {
        config.transport.mode = TransportMode::TcpSimulation;
        config.transport.tcp_address = address;
    }

    let prefs_path = cli
        .prefs
        .or_else(PreferenceStore::default_path)
        .context("no preference directory available, pass --prefs")?;
    let prefs = PreferenceStore::open(prefs_path)?;

    let (manager, mut events) =
        SerialLinkManager::with_channel(config.transport.provider(), config.link.link_config());
    info!("BlueRemote starting ({})", manager.transport_name());

    let initial = match cli.device {
        Some(address) => Some(address.parse::<DeviceId>()?),
        None if config.remote.auto_reconnect => prefs.last_device(),
        None => None,
    };

    let mut remote = Remote {
        manager,
        history: MessageHistory::new(config.link.history_limit),
        reserved: ReservedButtons::new(config.remote.reserved_signals()?),
        config,
        prefs,
        target: None,
    };

    match initial {
        Some(device) => remote.connect(device),
        None => println!("Not connected. Type `connect <address>` or `devices`."),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Main event loop
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => remote.handle_event(event),
                None => {
                    error!("Link manager closed");
                    break;
                }
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if remote.handle_line(&line).await == Flow::Quit {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },
        }
    }

    remote.manager.close();
    info!("BlueRemote stopped");
    Ok(())
}

impl Remote {
    fn connect(&mut self, device: DeviceId) {
        println!("Connecting to {}...", device);
        self.target = Some(device.clone());
        self.manager.connect(device);
    }

    fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected(device) => {
                println!("Connected to {}", device);
                if let Err(e) = self.prefs.remember(&device) {
                    warn!("Failed to remember {}: {:#}", device, e);
                }
            }
            LinkEvent::Disconnected => {
                println!("Disconnected");
                if let Err(e) = self.prefs.forget() {
                    warn!("Failed to clear last device: {:#}", e);
                }
            }
            LinkEvent::MessageReceived(payload) => {
                if let Some(entry) = self.history.push(&payload) {
                    println!("< {}", entry);
                }
            }
        }
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        let input = match parse_input(line) {
            Ok(Some(input)) => input,
            Ok(None) => return Flow::Continue,
            Err(e) => {
                println!("{}", e);
                return Flow::Continue;
            }
        };

        match input {
            RemoteInput::Command(command) => self.send_command(command).await,
            RemoteInput::Raw(text) => self.send(&text).await,
            RemoteInput::Bind { slot, signal } => {
                self.reserved.set(slot, signal);
                println!("Reserved button {} sends {:?}", slot + 1, signal);
            }
            RemoteInput::Reserved(slot) => match self.reserved.press(slot) {
                Some(command) => self.send_command(command).await,
                None => println!("Reserved button {} is not bound", slot + 1),
            },
            RemoteInput::Connect(device) => self.connect(device),
            RemoteInput::Reconnect => match self.target.clone() {
                Some(device) => self.connect(device),
                None => println!("No device to reconnect to"),
            },
            RemoteInput::Disconnect => self.manager.close(),
            RemoteInput::Devices => self.list_devices().await,
            RemoteInput::History => {
                if self.history.is_empty() {
                    println!("No messages yet");
                }
                for entry in self.history.iter() {
                    println!("  {}", entry);
                }
            }
            RemoteInput::ClearHistory => self.history.clear(),
            RemoteInput::Status => {
                let device = self
                    .manager
                    .device()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "no device".into());
                println!(
                    "{} ({}) via {}, {} connections, {} messages",
                    self.manager.state(),
                    device,
                    self.manager.transport_name(),
                    self.manager.connections(),
                    self.history.len()
                );
                if let Some(entry) = self.history.latest() {
                    println!("last: {}", entry);
                }
            }
            RemoteInput::Help => println!("{}", HELP),
            RemoteInput::Quit => return Flow::Quit,
        }

        Flow::Continue
    }

    async fn send_command(&self, command: RemoteCommand) {
        debug!("Button {:?}", command);
        self.send(&command.signal()).await;
    }

    async fn send(&self, signal: &str) {
        if let Err(e) = self.manager.send(signal).await {
            println!("{}", e);
        }
    }

    async fn list_devices(&self) {
        if self.config.transport.mode != TransportMode::Rfcomm {
            println!("Paired devices are only listed in rfcomm mode");
            return;
        }

        match transport::paired_devices().await {
            Ok(devices) if devices.is_empty() => println!("No paired devices"),
            Ok(devices) => {
                for device in devices {
                    let marker = if device.connected { " (connected)" } else { "" };
                    println!("  {}  {}{}", device.address, device.label(), marker);
                }
            }
            Err(e) => println!("Failed to list paired devices: {:#}", e),
        }
    }
}
