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

//! Bluetooth communication module.
//!
//! Handles the outgoing RFCOMM (SPP) link to the printer.

mod attempt;
#[cfg(feature = "bluez")]
mod bluez;
mod device;
mod service;
mod session;

#[cfg(feature = "bluez")]
pub use bluez::BluezBackend;
pub use device::{
    BoxReader, BoxWriter, DeviceHandle, DeviceResolver, RfcommSocket, SocketFactory, SPP_UUID,
};
pub use service::{PrintService, ServiceSnapshot};
