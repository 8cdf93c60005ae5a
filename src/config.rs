//! Configuration module.
//!
//! Settings are read from a TOML file; every section and field is optional
//! and falls back to its default.

use crate::connection::LinkConfig;
use crate::remote::RESERVED_BUTTONS;
use crate::transport::{
    RfcommConfig, RfcommProvider, SerialConfig, SerialProvider, TcpSimulationProvider,
    TransportProvider, DEFAULT_BAUD_RATE, DEFAULT_SIMULATION_ADDRESS,
};
use anyhow::{bail, Context, Result};
use blueremote_shared::codec::{Framing, READ_BUFFER_SIZE};
use blueremote_shared::parse_reserved_signal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkSettings,
    pub transport: TransportSettings,
    pub remote: RemoteSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub read_buffer_size: usize,
    /// Zero disables the timeout
    pub connect_timeout_secs: u64,
    pub framing: Framing,
    /// Messages kept in the history
    pub history_limit: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            read_buffer_size: READ_BUFFER_SIZE,
            connect_timeout_secs: 30,
            framing: Framing::Chunk,
            history_limit: 100,
        }
    }
}

impl LinkSettings {
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            read_buffer_size: self.read_buffer_size,
            connect_timeout: (self.connect_timeout_secs > 0)
                .then(|| Duration::from_secs(self.connect_timeout_secs)),
            framing: self.framing,
        }
    }
}

/// Which transport carries the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// BlueZ RFCOMM socket
    #[default]
    Rfcomm,
    /// Kernel RFCOMM TTY (`rfcomm bind`)
    Serial,
    /// TCP to the peripheral simulator
    TcpSimulation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub mode: TransportMode,
    /// Fixed RFCOMM channel; resolved from the service UUID when unset
    pub channel: Option<u8>,
    pub tcp_address: String,
    /// TTY for serial mode; the device id is used when unset
    pub serial_path: Option<String>,
    pub baud_rate: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            mode: TransportMode::Rfcomm,
            channel: None,
            tcp_address: DEFAULT_SIMULATION_ADDRESS.into(),
            serial_path: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl TransportSettings {
    /// Build the provider for the configured mode
    pub fn provider(&self) -> Arc<dyn TransportProvider> {
        match self.mode {
            TransportMode::Rfcomm => Arc::new(RfcommProvider::new(RfcommConfig {
                channel: self.channel,
            })),
            TransportMode::Serial => Arc::new(SerialProvider::new(SerialConfig {
                path: self.serial_path.clone(),
                baud_rate: self.baud_rate,
            })),
            TransportMode::TcpSimulation => {
                Arc::new(TcpSimulationProvider::new(self.tcp_address.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Signals bound to the reserved buttons, in button order
    pub reserved: Vec<String>,
    /// Reconnect to the last connected device on start-up
    pub auto_reconnect: bool,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            reserved: Vec::new(),
            auto_reconnect: true,
        }
    }
}

impl RemoteSettings {
    /// Validated reserved bindings
    pub fn reserved_signals(&self) -> Result<[Option<char>; RESERVED_BUTTONS]> {
        if self.reserved.len() > RESERVED_BUTTONS {
            bail!(
                "{} reserved bindings configured, only {} buttons exist",
                self.reserved.len(),
                RESERVED_BUTTONS
            );
        }

        let mut signals = [None; RESERVED_BUTTONS];
        for (slot, binding) in self.reserved.iter().enumerate() {
            signals[slot] = Some(
                parse_reserved_signal(binding)
                    .with_context(|| format!("reserved button {}", slot + 1))?,
            );
        }
        Ok(signals)
    }
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("blueremote").join("config.toml"))
    }

    /// Load from `path`, or the default location. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.remote.reserved_signals()?;
        Ok(config)
    }
}
