//! Preference storage for the last connected device

use anyhow::{Context, Result};
use blueremote_shared::DeviceId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Address of the device of the last successful connection
    pub last_device: Option<String>,
}

/// Preferences bound to a file, written through on every change
#[derive(Debug)]
pub struct PreferenceStore {
    path: PathBuf,
    prefs: Preferences,
}

impl PreferenceStore {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("blueremote").join("prefs.toml"))
    }

    /// Open the store at `path`; a missing file starts empty
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let prefs = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        } else {
            Preferences::default()
        };

        Ok(Self { path, prefs })
    }

    pub fn last_device(&self) -> Option<DeviceId> {
        self.prefs
            .last_device
            .as_deref()
            .and_then(|address| address.parse().ok())
    }

    pub fn remember(&mut self, device: &DeviceId) -> Result<()> {
        if self.prefs.last_device.as_deref() == Some(device.as_str()) {
            return Ok(());
        }
        self.prefs.last_device = Some(device.to_string());
        self.save()
    }

    pub fn forget(&mut self) -> Result<()> {
        if self.prefs.last_device.take().is_none() {
            return Ok(());
        }
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let content = toml::to_string(&self.prefs)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("writing {}", self.path.display()))?;
        debug!("Saved preferences to {}", self.path.display());
        Ok(())
    }
}
