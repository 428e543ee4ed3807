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

//! BlueZ RFCOMM backend.
//!
//! Sockets connect through a client profile registered for the service
//! UUID. BlueZ resolves the RFCOMM channel from the printer's SDP records
//! and hands the connected stream back as a profile connect request.

use anyhow::Result;
use async_trait::async_trait;
use bluer::rfcomm::{ConnectRequest, Profile, ProfileHandle, ReqError, Role, Stream};
use bluer::Address;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::device::{BoxReader, BoxWriter, DeviceHandle, DeviceResolver, RfcommSocket, SocketFactory};
use crate::error::BridgeError;

/// Sockets waiting for BlueZ to deliver their stream, by device.
type Waiters = Arc<Mutex<HashMap<Address, oneshot::Sender<ConnectRequest>>>>;

/// Socket factory and device resolver backed by the default BlueZ adapter.
pub struct BluezBackend {
    _session: bluer::Session,
    adapter: bluer::Adapter,
    service_uuid: Uuid,
    waiters: Waiters,
    shutdown: CancellationToken,
}

impl BluezBackend {
    /// Open a BlueZ session, power on the default adapter and register a
    /// client profile for `service_uuid`.
    pub async fn new(service_uuid: Uuid) -> Result<Self> {
        info!("Initializing Bluetooth backend...");

        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        let profile = Profile {
            uuid: service_uuid,
            name: Some("Woosim Print Bridge".to_string()),
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let handle = session.register_profile(profile).await?;
        info!("Registered client profile for service {}", service_uuid);

        let waiters = Waiters::default();
        let shutdown = CancellationToken::new();
        tokio::spawn(dispatch_requests(handle, waiters.clone(), shutdown.clone()));

        Ok(Self {
            _session: session,
            adapter,
            service_uuid,
            waiters,
            shutdown,
        })
    }
}

impl Drop for BluezBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Route profile connect requests to the socket waiting on that device.
async fn dispatch_requests(handle: ProfileHandle, waiters: Waiters, shutdown: CancellationToken) {
    let mut handle = Box::pin(handle);
    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            request = handle.next() => request,
        };
        let Some(request) = request else {
            warn!("Profile handle closed");
            break;
        };

        let address = request.device();
        let waiter = waiters.lock().remove(&address);
        match waiter {
            Some(tx) => {
                if let Err(request) = tx.send(request) {
                    debug!("Connection from {} no longer awaited", address);
                    let _ = request.reject(ReqError::Rejected);
                }
            }
            None => {
                debug!("Rejecting unsolicited connection from {}", address);
                let _ = request.reject(ReqError::Rejected);
            }
        }
    }
    debug!("Profile dispatcher stopped");
}

fn parse_address(address: &str) -> io::Result<Address> {
    address
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{}: {}", address, e)))
}

fn to_io(e: bluer::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

#[async_trait]
impl DeviceResolver for BluezBackend {
    async fn resolve(&self, address: &str) -> Result<DeviceHandle, BridgeError> {
        let failed = |reason: String| BridgeError::ConnectionFailed {
            address: address.to_string(),
            reason,
        };

        let addr = parse_address(address).map_err(|e| failed(e.to_string()))?;
        let device = self.adapter.device(addr).map_err(|e| failed(e.to_string()))?;
        let name = device.alias().await.unwrap_or_else(|_| addr.to_string());
        Ok(DeviceHandle::new(addr.to_string(), name))
    }
}

impl SocketFactory for BluezBackend {
    fn create_socket(
        &self,
        device: &DeviceHandle,
        service: Uuid,
    ) -> io::Result<Box<dyn RfcommSocket>> {
        if service != self.service_uuid {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("no profile registered for service {}", service),
            ));
        }

        let address = parse_address(device.address())?;
        let handle = self.adapter.device(address).map_err(to_io)?;
        debug!("Creating RFCOMM socket to {} for service {}", device, service);

        Ok(Box::new(BluezSocket {
            device: handle,
            address,
            service,
            waiters: self.waiters.clone(),
            stream: None,
        }))
    }
}

/// RFCOMM client socket opened through the registered profile.
struct BluezSocket {
    device: bluer::Device,
    address: Address,
    service: Uuid,
    waiters: Waiters,
    stream: Option<Stream>,
}

#[async_trait]
impl RfcommSocket for BluezSocket {
    async fn connect(&mut self) -> io::Result<()> {
        let (tx, rx) = oneshot::channel();
        // Replaces the waiter of an abandoned attempt to the same device.
        self.waiters.lock().insert(self.address, tx);

        self.device
            .connect_profile(&self.service)
            .await
            .map_err(to_io)?;

        let request = rx.await.map_err(|_| {
            io::Error::new(io::ErrorKind::ConnectionAborted, "profile stream not delivered")
        })?;
        self.stream = Some(request.accept().map_err(to_io)?);
        Ok(())
    }

    fn into_split(self: Box<Self>) -> io::Result<(BoxReader, BoxWriter)> {
        let stream = self
            .stream
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket not connected"))?;
        let (reader, writer) = stream.into_split();
        Ok((Box::new(reader), Box::new(writer)))
    }

    async fn close(&mut self) -> io::Result<()> {
        match self.stream.take() {
            Some(mut stream) => stream.shutdown().await,
            None => Ok(()),
        }
    }
}
