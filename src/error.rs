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

//! Errors returned to bridge callers.
//!
//! The transport core never fails a caller; these only cover the method
//! dispatch layer in [`crate::bridge`].

use thiserror::Error;

/// Error reported back over the method channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The MAC address argument is missing.
    #[error("MAC address is null")]
    InvalidMac,

    /// The data argument is missing or not valid base64.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The device could not be resolved or connected.
    #[error("could not connect to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// Unknown method.
    #[error("method not implemented: {0}")]
    NotImplemented(String),
}

impl BridgeError {
    /// Stable error code for the method channel.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidMac => "INVALID_MAC",
            BridgeError::InvalidData(_) => "INVALID_DATA",
            BridgeError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            BridgeError::NotImplemented(_) => "NOT_IMPLEMENTED",
        }
    }
}
