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

//! Transport session over an established printer link.

use std::io;
use std::sync::{Arc, Weak};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::device::{BoxReader, BoxWriter, RfcommSocket};
use super::service::ServiceCore;
use crate::events::UiMessage;

/// Handler for a single established link.
///
/// The read loop runs on its own task; writes happen on the caller's task.
pub(super) struct TransportSession {
    id: u64,
    writer: AsyncMutex<Option<BoxWriter>>,
    cancel: CancellationToken,
    service: Weak<ServiceCore>,
}

impl TransportSession {
    /// Split `socket` and spawn the read loop on `runtime`.
    pub(super) fn spawn(
        runtime: &Handle,
        id: u64,
        socket: Box<dyn RfcommSocket>,
        service: Weak<ServiceCore>,
        buffer_size: usize,
    ) -> Arc<Self> {
        let (reader, writer) = match socket.into_split() {
            Ok((reader, writer)) => (Some(reader), Some(writer)),
            Err(e) => {
                error!("Session {} streams not created: {}", id, e);
                (None, None)
            }
        };

        let session = Arc::new(Self {
            id,
            writer: AsyncMutex::new(writer),
            cancel: CancellationToken::new(),
            service,
        });
        runtime.spawn(session.clone().read_loop(reader, buffer_size));
        session
    }

    pub(super) fn id(&self) -> u64 {
        self.id
    }

    /// Stop the read loop and close the link.
    pub(super) fn cancel(&self) {
        self.cancel.cancel();
    }

    async fn read_loop(self: Arc<Self>, reader: Option<BoxReader>, buffer_size: usize) {
        info!("Session {} started", self.id);

        let Some(mut reader) = reader else {
            self.report_lost();
            self.close(None).await;
            return;
        };

        let mut buffer = vec![0u8; buffer_size];
        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                read = reader.read(&mut buffer) => read,
            };

            match read {
                Ok(0) => {
                    info!("Session {} closed by remote", self.id);
                    self.report_lost();
                    break;
                }
                Ok(n) => {
                    debug!("Session {} received {} bytes", self.id, n);
                    let Some(service) = self.service.upgrade() else {
                        break;
                    };
                    // The buffer is reused by the next read.
                    service.deliver(UiMessage::Read {
                        bytes: n,
                        data: buffer[..n].to_vec(),
                    });
                }
                Err(e) => {
                    error!("Session {} read error: {}", self.id, e);
                    self.report_lost();
                    break;
                }
            }
        }

        self.close(Some(reader)).await;
    }

    /// Write the whole of `out` to the link.
    ///
    /// Cancelling the session aborts a write that is waiting on the link
    /// and releases the writer so `close` can shut it down.
    pub(super) async fn write(&self, out: &[u8]) {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.write_locked(out) => Some(result),
        };

        match result {
            None => debug!("Session {} write aborted by cancellation", self.id),
            Some(Ok(())) => {}
            Some(Err(e)) => {
                error!("Session {} write error: {}", self.id, e);
                self.report_lost();
            }
        }
    }

    async fn write_locked(&self, out: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(writer) => write_all(writer, out).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "session output closed",
            )),
        }
    }

    fn report_lost(&self) {
        if let Some(service) = self.service.upgrade() {
            service.connection_lost(self.id);
        }
    }

    /// Close input, then output. Errors are logged and swallowed.
    async fn close(&self, reader: Option<BoxReader>) {
        drop(reader);

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                warn!("Session {} output close failed: {}", self.id, e);
            }
        }
        debug!("Session {} closed", self.id);
    }
}

async fn write_all(writer: &mut BoxWriter, out: &[u8]) -> io::Result<()> {
    writer.write_all(out).await?;
    writer.flush().await
}
