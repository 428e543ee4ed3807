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

//! Method-call bridge between the UI runtime and the print service.
//!
//! Calls arrive as JSON objects `{"method": ..., "args": {...}}` and are
//! answered with `{"result": ...}` or `{"error": {"code": ..., "message": ...}}`.

use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bluetooth::{DeviceResolver, PrintService};
use crate::error::BridgeError;
use crate::state::ConnectionState;
use crate::status::{ConnectionStatus, StatusBridge};

/// A method call from the UI runtime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "camelCase")]
pub enum MethodCall {
    ConnectToDevice {
        #[serde(rename = "macAddress")]
        mac_address: Option<String>,
    },
    ConnectToDeviceWithHandling {
        #[serde(rename = "macAddress")]
        mac_address: Option<String>,
    },
    DisconnectDevice,
    CheckPrinterStatus,
    /// Raw bytes for the printer, base64 encoded.
    WriteBytes { data: Option<String> },
}

/// Reply to a method call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MethodReply {
    Result(String),
    Error { code: String, message: String },
}

impl From<Result<String, BridgeError>> for MethodReply {
    fn from(result: Result<String, BridgeError>) -> Self {
        match result {
            Ok(value) => MethodReply::Result(value),
            Err(e) => MethodReply::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            },
        }
    }
}

/// Dispatches method calls to a [`PrintService`].
pub struct PrinterBridge {
    service: PrintService,
    resolver: Arc<dyn DeviceResolver>,
    status: StatusBridge,
    /// Address most recently requested through `connectToDeviceWithHandling`.
    requested: Mutex<Option<String>>,
}

impl PrinterBridge {
    pub fn new(
        service: PrintService,
        resolver: Arc<dyn DeviceResolver>,
        status: StatusBridge,
    ) -> Self {
        Self {
            service,
            resolver,
            status,
            requested: Mutex::new(None),
        }
    }

    pub fn service(&self) -> &PrintService {
        &self.service
    }

    /// Handle one method call.
    pub async fn call(&self, call: MethodCall) -> Result<String, BridgeError> {
        debug!("Method call: {:?}", call);
        match call {
            MethodCall::ConnectToDevice { mac_address } => {
                let address = mac_address.ok_or(BridgeError::InvalidMac)?;
                self.connect_to(&address).await?;
                Ok(format!("Connecting to {}", address))
            }
            MethodCall::ConnectToDeviceWithHandling { mac_address } => {
                let address = mac_address.ok_or(BridgeError::InvalidMac)?;
                self.connect_with_handling(&address).await
            }
            MethodCall::DisconnectDevice => {
                self.service.stop();
                *self.requested.lock() = None;
                Ok("Disconnected from printer".to_string())
            }
            MethodCall::CheckPrinterStatus => Ok(match self.service.state() {
                ConnectionState::Connected => "CONNECTED".to_string(),
                _ => "DISCONNECTED".to_string(),
            }),
            MethodCall::WriteBytes { data } => {
                let data = data.ok_or_else(|| BridgeError::InvalidData("data is null".into()))?;
                let bytes = STANDARD
                    .decode(data.as_bytes())
                    .map_err(|e| BridgeError::InvalidData(e.to_string()))?;
                self.service.write(&bytes).await;
                Ok(format!("Submitted {} bytes", bytes.len()))
            }
        }
    }

    /// Handle one JSON-encoded method call and encode the reply.
    pub async fn handle_json(&self, request: &str) -> serde_json::Result<String> {
        let result = match serde_json::from_str::<MethodCall>(request) {
            Ok(call) => self.call(call).await,
            Err(e) => {
                warn!("Unsupported method call {}: {}", request.trim(), e);
                Err(BridgeError::NotImplemented(e.to_string()))
            }
        };
        serde_json::to_string(&MethodReply::from(result))
    }

    async fn connect_to(&self, address: &str) -> Result<(), BridgeError> {
        let device = self.resolver.resolve(address).await?;
        self.service.connect(device);
        Ok(())
    }

    async fn connect_with_handling(&self, address: &str) -> Result<String, BridgeError> {
        let already = self.service.state() == ConnectionState::Connected
            && self.requested.lock().as_deref() == Some(address);
        if already {
            return Ok(format!("Already connected to {}", address));
        }

        let previous = self.requested.lock().take();
        if let Some(previous) = previous {
            info!("Dropping connection to {} before switching", previous);
            self.service.stop();
            self.status.publish(&ConnectionStatus::Disconnected);
        }

        self.connect_to(address).await?;
        *self.requested.lock() = Some(address.to_string());
        Ok(format!("Connecting to {}", address))
    }
}
