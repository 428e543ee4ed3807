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

//! Outgoing connection attempt.

use std::sync::Weak;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::device::{DeviceHandle, RfcommSocket, SocketFactory};
use super::service::ServiceCore;

/// Single-shot task connecting to one device.
///
/// Runs straight through: the connection either succeeds and the socket is
/// handed to the service, or it fails and the socket is closed here.
pub(super) struct ConnectionAttempt {
    id: u64,
    device: DeviceHandle,
    socket: Option<Box<dyn RfcommSocket>>,
    cancel: CancellationToken,
    service: Weak<ServiceCore>,
}

impl ConnectionAttempt {
    /// Create an attempt and its socket.
    ///
    /// A socket creation failure is logged and reported when the attempt runs.
    pub(super) fn new(
        id: u64,
        device: DeviceHandle,
        factory: &dyn SocketFactory,
        service_uuid: Uuid,
        service: Weak<ServiceCore>,
    ) -> Self {
        let socket = match factory.create_socket(&device, service_uuid) {
            Ok(socket) => Some(socket),
            Err(e) => {
                error!("Socket creation for {} failed: {}", device, e);
                None
            }
        };

        Self {
            id,
            device,
            socket,
            cancel: CancellationToken::new(),
            service,
        }
    }

    pub(super) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the attempt to completion.
    pub(super) async fn run(mut self) {
        let Some(mut socket) = self.socket.take() else {
            self.report_failure();
            return;
        };

        debug!("Attempt {} connecting to {}", self.id, self.device);
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = socket.connect() => Some(result),
        };

        match outcome {
            None => {
                debug!("Attempt {} cancelled", self.id);
                close_socket(socket.as_mut()).await;
            }
            Some(Err(e)) => {
                error!("Connection to {} failed: {}", self.device, e);
                close_socket(socket.as_mut()).await;
                self.report_failure();
            }
            Some(Ok(())) => {
                info!("Attempt {} reached {}", self.id, self.device);
                let Some(service) = self.service.upgrade() else {
                    close_socket(socket.as_mut()).await;
                    return;
                };
                if let Err(mut socket) = service.connected(self.id, socket, self.device.clone()) {
                    close_socket(socket.as_mut()).await;
                }
            }
        }
    }

    fn report_failure(&self) {
        if let Some(service) = self.service.upgrade() {
            service.connection_failed(self.id);
        }
    }
}

async fn close_socket(socket: &mut dyn RfcommSocket) {
    if let Err(e) = socket.close().await {
        warn!("Unable to close socket: {}", e);
    }
}
