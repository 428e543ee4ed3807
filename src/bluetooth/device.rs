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

//! Device handles and the platform socket capability.

use async_trait::async_trait;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::error::BridgeError;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Read half of an established link.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of an established link.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A remote Bluetooth device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    address: String,
    name: String,
}

impl DeviceHandle {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// An unconnected stream socket to a remote device.
#[async_trait]
pub trait RfcommSocket: Send {
    /// Connect to the remote service. May wait for a long time.
    async fn connect(&mut self) -> io::Result<()>;

    /// Split a connected socket into its read and write halves.
    fn into_split(self: Box<Self>) -> io::Result<(BoxReader, BoxWriter)>;

    /// Close the socket. Best effort, safe to call more than once.
    async fn close(&mut self) -> io::Result<()>;
}

/// Creates sockets to remote devices.
pub trait SocketFactory: Send + Sync {
    fn create_socket(&self, device: &DeviceHandle, service: Uuid)
        -> io::Result<Box<dyn RfcommSocket>>;
}

/// Looks up a device by its address.
#[async_trait]
pub trait DeviceResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<DeviceHandle, BridgeError>;
}
