//! Link listener contract
//!
//! Per connection lifecycle the listener sees `on_connected` at most once,
//! then any number of `on_message_received`, then exactly one
//! `on_disconnected`. A connect attempt that fails yields only
//! `on_disconnected`. Callbacks run on the manager's dispatch task, so a
//! consumer with its own presentation thread marshals onto it.

use blueremote_shared::DeviceId;
use tokio::sync::mpsc;

/// Consumer-supplied callbacks
pub trait LinkListener: Send + Sync + 'static {
    fn on_connected(&self, device: &DeviceId);
    fn on_disconnected(&self);
    fn on_message_received(&self, payload: &str);
}

/// A listener notification as a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected(DeviceId),
    Disconnected,
    MessageReceived(String),
}

impl LinkEvent {
    /// Invoke the matching listener callback
    pub fn deliver(&self, listener: &dyn LinkListener) {
        match self {
            LinkEvent::Connected(device) => listener.on_connected(device),
            LinkEvent::Disconnected => listener.on_disconnected(),
            LinkEvent::MessageReceived(payload) => listener.on_message_received(payload),
        }
    }
}

/// Forward notifications into a queue
impl LinkListener for mpsc::UnboundedSender<LinkEvent> {
    fn on_connected(&self, device: &DeviceId) {
        let _ = self.send(LinkEvent::Connected(device.clone()));
    }

    fn on_disconnected(&self) {
        let _ = self.send(LinkEvent::Disconnected);
    }

    fn on_message_received(&self, payload: &str) {
        let _ = self.send(LinkEvent::MessageReceived(payload.to_string()));
    }
}
