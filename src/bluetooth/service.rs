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

//! Print service: the connection state machine.
//!
//! The service owns at most one [`ConnectionAttempt`] and at most one
//! [`TransportSession`]. Every transition runs under a single lock covering
//! the state and both task handles. Attempts and sessions report back through
//! the `connected`, `connection_failed` and `connection_lost` callbacks, each
//! tagged with the task id so late reports from replaced tasks are dropped.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::attempt::ConnectionAttempt;
use super::device::{DeviceHandle, RfcommSocket, SocketFactory};
use super::session::TransportSession;
use crate::config::BluetoothConfig;
use crate::events::{MessageSink, Toast, UiMessage};
use crate::state::ConnectionState;
use crate::status::{ConnectionStatus, StatusBridge};

/// Handle to the attempt currently in flight.
struct AttemptHandle {
    id: u64,
    cancel: CancellationToken,
}

/// State guarded by the service lock.
#[derive(Default)]
struct Inner {
    state: ConnectionState,
    attempt: Option<AttemptHandle>,
    session: Option<Arc<TransportSession>>,
    device: Option<DeviceHandle>,
}

impl Inner {
    fn is_consistent(&self) -> bool {
        self.snapshot().is_consistent()
    }

    /// Cancel and clear both tasks, then move to `state`.
    fn reset(&mut self, state: ConnectionState) {
        if let Some(attempt) = self.attempt.take() {
            attempt.cancel.cancel();
        }
        if let Some(session) = self.session.take() {
            session.cancel();
        }
        self.device = None;
        self.state = state;
    }

    fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            state: self.state,
            attempt_live: self.attempt.is_some(),
            session_live: self.session.is_some(),
        }
    }
}

/// Point-in-time view of the service, read under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSnapshot {
    pub state: ConnectionState,
    pub attempt_live: bool,
    pub session_live: bool,
}

impl ServiceSnapshot {
    /// Whether the state agrees with the set of live tasks.
    pub fn is_consistent(&self) -> bool {
        match self.state {
            ConnectionState::None | ConnectionState::Listening => {
                !self.attempt_live && !self.session_live
            }
            ConnectionState::Connecting => self.attempt_live && !self.session_live,
            ConnectionState::Connected => !self.attempt_live && self.session_live,
        }
    }
}

/// Shared core behind [`PrintService`] handles.
///
/// Attempts and sessions hold a `Weak` reference to it.
pub(super) struct ServiceCore {
    runtime: Handle,
    factory: Arc<dyn SocketFactory>,
    sink: Arc<dyn MessageSink>,
    status: StatusBridge,
    config: BluetoothConfig,
    next_id: AtomicU64,
    inner: Mutex<Inner>,
}

impl ServiceCore {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn start(&self) {
        let mut inner = self.inner.lock();
        inner.reset(ConnectionState::Listening);
        debug_assert!(inner.is_consistent());
        info!("Print service listening");
    }

    fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.reset(ConnectionState::None);
        debug_assert!(inner.is_consistent());
        info!("Print service stopped");
    }

    fn connect(self: &Arc<Self>, device: DeviceHandle) {
        let mut inner = self.inner.lock();

        if let Some(attempt) = inner.attempt.take() {
            debug!("Cancelling attempt {}", attempt.id);
            attempt.cancel.cancel();
        }
        if let Some(session) = inner.session.take() {
            debug!("Tearing down session {} for reconnect", session.id());
            session.cancel();
        }

        let id = self.next_id();
        info!("Connecting to {} (attempt {})", device, id);
        let attempt = ConnectionAttempt::new(
            id,
            device,
            self.factory.as_ref(),
            self.config.service_uuid,
            Arc::downgrade(self),
        );
        let cancel = attempt.cancel_token();
        self.runtime.spawn(attempt.run());

        inner.attempt = Some(AttemptHandle { id, cancel });
        inner.device = None;
        inner.state = ConnectionState::Connecting;
        debug_assert!(inner.is_consistent());
    }

    /// Promote a finished attempt into a session.
    ///
    /// Hands the socket back when `attempt_id` is no longer the installed
    /// attempt; the caller is then responsible for closing it.
    pub(super) fn connected(
        self: &Arc<Self>,
        attempt_id: u64,
        socket: Box<dyn RfcommSocket>,
        device: DeviceHandle,
    ) -> Result<(), Box<dyn RfcommSocket>> {
        let mut inner = self.inner.lock();

        if inner.attempt.as_ref().map(|a| a.id) != Some(attempt_id) {
            warn!("Attempt {} finished after being replaced", attempt_id);
            return Err(socket);
        }
        inner.attempt = None;

        if let Some(session) = inner.session.take() {
            session.cancel();
        }

        let session_id = self.next_id();
        let session = TransportSession::spawn(
            &self.runtime,
            session_id,
            socket,
            Arc::downgrade(self),
            self.config.buffer_size(),
        );
        info!("Connected to {} (session {})", device, session_id);

        let name = device.name().to_string();
        inner.session = Some(session);
        inner.device = Some(device);
        inner.state = ConnectionState::Connected;
        debug_assert!(inner.is_consistent());

        self.sink.send(UiMessage::DeviceName(name.clone()));
        self.status.publish(&ConnectionStatus::Connected(name));
        Ok(())
    }

    pub(super) fn connection_failed(&self, attempt_id: u64) {
        let mut inner = self.inner.lock();

        // Shutting down.
        if inner.state == ConnectionState::None {
            return;
        }
        if inner.attempt.as_ref().map(|a| a.id) != Some(attempt_id) {
            debug!("Ignoring failure of stale attempt {}", attempt_id);
            return;
        }

        inner.reset(ConnectionState::Listening);
        debug_assert!(inner.is_consistent());

        self.sink.send(UiMessage::Toast(Toast::ConnectFailed));
        self.status.publish(&ConnectionStatus::Failed);
        info!("Connection attempt {} failed, listening again", attempt_id);
    }

    pub(super) fn connection_lost(&self, session_id: u64) {
        let mut inner = self.inner.lock();

        if inner.state == ConnectionState::None {
            return;
        }
        if inner.session.as_ref().map(|s| s.id()) != Some(session_id) {
            debug!("Ignoring loss of stale session {}", session_id);
            return;
        }

        inner.reset(ConnectionState::Listening);
        debug_assert!(inner.is_consistent());

        self.sink.send(UiMessage::Toast(Toast::ConnectLost));
        self.status.publish(&ConnectionStatus::Disconnected);
        info!("Session {} lost, listening again", session_id);
    }

    /// Deliver a message to the UI sink.
    pub(super) fn deliver(&self, message: UiMessage) {
        self.sink.send(message);
    }
}

impl Drop for ServiceCore {
    fn drop(&mut self) {
        self.inner.get_mut().reset(ConnectionState::None);
    }
}

/// Connection manager for a single SPP printer.
///
/// Cheap to clone; clones share the same state machine. All operations may
/// be called from any thread.
#[derive(Clone)]
pub struct PrintService {
    core: Arc<ServiceCore>,
}

impl PrintService {
    /// Create a new print service in the `None` state.
    ///
    /// Attempt and session tasks are spawned on `runtime`.
    pub fn new(
        runtime: Handle,
        factory: Arc<dyn SocketFactory>,
        sink: Arc<dyn MessageSink>,
        status: StatusBridge,
        config: BluetoothConfig,
    ) -> Self {
        Self {
            core: Arc::new(ServiceCore {
                runtime,
                factory,
                sink,
                status,
                config,
                next_id: AtomicU64::new(1),
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    /// Drop any attempt or session and enter `Listening`.
    pub fn start(&self) {
        self.core.start();
    }

    /// Start connecting to `device`, replacing any attempt or session.
    pub fn connect(&self, device: DeviceHandle) {
        self.core.connect(device);
    }

    /// Write `out` to the printer.
    ///
    /// When not connected, sends a [`Toast::NotConnected`] notice instead.
    /// The state lock is not held during I/O.
    pub async fn write(&self, out: &[u8]) {
        let session = {
            let inner = self.core.inner.lock();
            if inner.state.is_connected() {
                inner.session.clone()
            } else {
                None
            }
        };

        match session {
            Some(session) => session.write(out).await,
            None => self.core.deliver(UiMessage::Toast(Toast::NotConnected)),
        }
    }

    /// Drop any attempt or session and enter `None`.
    pub fn stop(&self) {
        self.core.stop();
    }

    pub fn state(&self) -> ConnectionState {
        self.core.inner.lock().state
    }

    /// Device of the running session.
    pub fn connected_device(&self) -> Option<DeviceHandle> {
        self.core.inner.lock().device.clone()
    }

    pub fn snapshot(&self) -> ServiceSnapshot {
        self.core.inner.lock().snapshot()
    }
}
