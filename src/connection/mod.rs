//! Serial link management
//!
//! This module handles:
//! - Opening and tearing down the single link to a peripheral
//! - The inbound read loop running beside outbound signal writes
//! - Superseding stale connect attempts
//! - Ordered listener notifications

mod cancel;
mod link;
mod listener;
mod manager;

pub use listener::{LinkEvent, LinkListener};
pub use manager::{LinkConfig, SerialLinkManager};
