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

//! Messages delivered from the print service to the UI layer.

use tokio::sync::mpsc;
use tracing::debug;

/// Short user-facing notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toast {
    /// `write` was called while no printer is connected.
    NotConnected,
    /// The outgoing connection attempt failed.
    ConnectFailed,
    /// An established connection dropped.
    ConnectLost,
}

impl Toast {
    pub fn message(&self) -> &'static str {
        match self {
            Toast::NotConnected => "You are not connected to a device",
            Toast::ConnectFailed => "Unable to connect device",
            Toast::ConnectLost => "Device connection was lost",
        }
    }
}

/// A message for the UI loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiMessage {
    /// Name of the device that just connected.
    DeviceName(String),
    /// A chunk read from the printer.
    Read { bytes: usize, data: Vec<u8> },
    /// Notice to show the user.
    Toast(Toast),
}

/// Ordered, fire-and-forget sink for UI messages.
///
/// Implementations must not block: `send` is called while the service
/// holds its state lock.
pub trait MessageSink: Send + Sync {
    fn send(&self, message: UiMessage);
}

impl MessageSink for mpsc::UnboundedSender<UiMessage> {
    fn send(&self, message: UiMessage) {
        if mpsc::UnboundedSender::send(self, message).is_err() {
            debug!("UI receiver dropped, message discarded");
        }
    }
}
