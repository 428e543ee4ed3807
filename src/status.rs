// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connection status publishing to an external listener.
//!
//! The listener lives on the other side of a runtime boundary (the UI
//! framework). Statuses are encoded as plain strings and pushed through an
//! unbounded channel, so publishing never blocks the caller.

use parking_lot::RwLock;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tracing::debug;

/// Name of the listener method receiving status updates.
pub const STATUS_METHOD: &str = "updateStatusConnection";

const SEPARATOR: char = '|';

/// Connection status reported to the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected(String),
    Failed,
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected(name) => write!(f, "CONNECTED{}{}", SEPARATOR, name),
            ConnectionStatus::Failed => f.write_str("FAILED"),
            ConnectionStatus::Disconnected => f.write_str("DISCONNECTED"),
        }
    }
}

/// Error parsing a status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown connection status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for ConnectionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(SEPARATOR) {
            Some(("CONNECTED", name)) => Ok(ConnectionStatus::Connected(name.to_string())),
            Some(_) => Err(ParseStatusError(s.to_string())),
            None => match s {
                "FAILED" => Ok(ConnectionStatus::Failed),
                "DISCONNECTED" => Ok(ConnectionStatus::Disconnected),
                _ => Err(ParseStatusError(s.to_string())),
            },
        }
    }
}

/// One-way status publisher.
///
/// Cloning shares the listener slot.
#[derive(Debug, Clone, Default)]
pub struct StatusBridge {
    listener: Arc<RwLock<Option<mpsc::UnboundedSender<String>>>>,
}

impl StatusBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide bridge instance.
    pub fn global() -> &'static StatusBridge {
        static GLOBAL: OnceLock<StatusBridge> = OnceLock::new();
        GLOBAL.get_or_init(StatusBridge::new)
    }

    /// Install (`Some`) or tear down (`None`) the listener.
    pub fn set_listener(&self, listener: Option<mpsc::UnboundedSender<String>>) {
        *self.listener.write() = listener;
    }

    pub fn has_listener(&self) -> bool {
        self.listener.read().is_some()
    }

    /// Publish a status. No-op without a listener.
    pub fn publish(&self, status: &ConnectionStatus) {
        if let Some(ref tx) = *self.listener.read() {
            if tx.send(status.to_string()).is_err() {
                debug!("Status listener gone, dropping {}", status);
            }
        }
    }
}
