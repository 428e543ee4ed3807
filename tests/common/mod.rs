//! Shared test doubles: a scriptable socket factory and helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use woosim_print_bridge::bluetooth::{BoxReader, BoxWriter, RfcommSocket, SocketFactory};
use woosim_print_bridge::config::BluetoothConfig;
use woosim_print_bridge::{DeviceHandle, PrintService, StatusBridge, UiMessage};

const WAIT: Duration = Duration::from_secs(2);

/// Test-side control of one socket handed out by [`MockFactory`].
pub struct MockLink {
    pub device: DeviceHandle,
    pub service: Uuid,
    connect_tx: Mutex<Option<oneshot::Sender<io::Result<()>>>>,
    read_tx: mpsc::UnboundedSender<io::Result<Vec<u8>>>,
    written: Mutex<Vec<u8>>,
    write_calls: Mutex<usize>,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
    closed: AtomicBool,
}

impl MockLink {
    /// Let the pending connect succeed.
    pub fn accept(&self) {
        if let Some(tx) = self.connect_tx.lock().take() {
            let _ = tx.send(Ok(()));
        }
    }

    /// Make the pending connect fail.
    pub fn refuse(&self) {
        if let Some(tx) = self.connect_tx.lock().take() {
            let _ = tx.send(Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "host is down",
            )));
        }
    }

    /// Deliver a chunk to the session's next read.
    pub fn feed(&self, bytes: &[u8]) {
        let _ = self.read_tx.send(Ok(bytes.to_vec()));
    }

    /// Make the session's next read fail.
    pub fn fail_read(&self) {
        let _ = self.read_tx.send(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )));
    }

    /// Make the session's next read hit end-of-stream.
    pub fn hang_up(&self) {
        let _ = self.read_tx.send(Ok(Vec::new()));
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make writes hang as if the printer stopped draining its buffer.
    pub fn set_stall_writes(&self, stall: bool) {
        self.stall_writes.store(stall, Ordering::SeqCst);
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub fn write_calls(&self) -> usize {
        *self.write_calls.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until the link has been closed by the code under test.
    pub async fn wait_closed(&self) -> bool {
        let deadline = tokio::time::Instant::now() + WAIT;
        while tokio::time::Instant::now() < deadline {
            if self.is_closed() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.is_closed()
    }
}

/// Socket factory handing out [`MockLink`]-controlled sockets.
#[derive(Default)]
pub struct MockFactory {
    links: Mutex<Vec<Arc<MockLink>>>,
    fail_create: AtomicBool,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn links(&self) -> Vec<Arc<MockLink>> {
        self.links.lock().clone()
    }

    /// Most recently created link.
    pub fn last(&self) -> Arc<MockLink> {
        self.links
            .lock()
            .last()
            .cloned()
            .expect("no socket was created")
    }
}

impl SocketFactory for MockFactory {
    fn create_socket(
        &self,
        device: &DeviceHandle,
        service: Uuid,
    ) -> io::Result<Box<dyn RfcommSocket>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "adapter is off"));
        }

        let (connect_tx, connect_rx) = oneshot::channel();
        let (read_tx, read_rx) = mpsc::unbounded_channel();
        let link = Arc::new(MockLink {
            device: device.clone(),
            service,
            connect_tx: Mutex::new(Some(connect_tx)),
            read_tx,
            written: Mutex::new(Vec::new()),
            write_calls: Mutex::new(0),
            fail_writes: AtomicBool::new(false),
            stall_writes: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.links.lock().push(link.clone());

        Ok(Box::new(MockSocket {
            link,
            connect_rx: Some(connect_rx),
            read_rx: Some(read_rx),
        }))
    }
}

struct MockSocket {
    link: Arc<MockLink>,
    connect_rx: Option<oneshot::Receiver<io::Result<()>>>,
    read_rx: Option<mpsc::UnboundedReceiver<io::Result<Vec<u8>>>>,
}

#[async_trait]
impl RfcommSocket for MockSocket {
    async fn connect(&mut self) -> io::Result<()> {
        let rx = self
            .connect_rx
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "connect called twice"))?;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::ConnectionAborted, "abandoned")),
        }
    }

    fn into_split(mut self: Box<Self>) -> io::Result<(BoxReader, BoxWriter)> {
        let rx = self
            .read_rx
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "already split"))?;
        Ok((
            Box::new(MockReader { rx }),
            Box::new(MockWriter {
                link: self.link.clone(),
            }),
        ))
    }

    async fn close(&mut self) -> io::Result<()> {
        self.link.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockReader {
    rx: mpsc::UnboundedReceiver<io::Result<Vec<u8>>>,
}

impl AsyncRead for MockReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                buf.put_slice(&chunk);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Err(e)),
            Poll::Ready(None) => Poll::Ready(Ok(())),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct MockWriter {
    link: Arc<MockLink>,
}

impl AsyncWrite for MockWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.link.fail_writes.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")));
        }
        if self.link.stall_writes.load(Ordering::SeqCst) {
            return Poll::Pending;
        }
        self.link.written.lock().extend_from_slice(buf);
        *self.link.write_calls.lock() += 1;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.link.closed.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// A print service wired to a mock factory and captured channels.
pub struct Harness {
    pub service: PrintService,
    pub factory: Arc<MockFactory>,
    pub status: StatusBridge,
    pub ui_rx: mpsc::UnboundedReceiver<UiMessage>,
    pub status_rx: mpsc::UnboundedReceiver<String>,
}

impl Harness {
    /// Build a harness on the current runtime.
    pub fn new() -> Self {
        Self::with_config(BluetoothConfig::default())
    }

    pub fn with_config(config: BluetoothConfig) -> Self {
        let factory = MockFactory::new();
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let status = StatusBridge::new();
        status.set_listener(Some(status_tx));

        let service = PrintService::new(
            Handle::current(),
            factory.clone(),
            Arc::new(ui_tx),
            status.clone(),
            config,
        );

        Self {
            service,
            factory,
            status,
            ui_rx,
            status_rx,
        }
    }

    pub async fn next_ui(&mut self) -> UiMessage {
        tokio::time::timeout(WAIT, self.ui_rx.recv())
            .await
            .expect("timed out waiting for UI message")
            .expect("UI channel closed")
    }

    pub async fn next_status(&mut self) -> String {
        tokio::time::timeout(WAIT, self.status_rx.recv())
            .await
            .expect("timed out waiting for status")
            .expect("status channel closed")
    }

    /// Assert nothing is emitted for a short while.
    pub async fn assert_quiet(&mut self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(self.ui_rx.try_recv().is_err(), "unexpected UI message");
        assert!(self.status_rx.try_recv().is_err(), "unexpected status");
    }

    /// Connect to `device` and drive the attempt to success.
    pub async fn connect_ok(&mut self, device: DeviceHandle) -> Arc<MockLink> {
        self.service.connect(device);
        let link = self.factory.last();
        link.accept();
        self.next_ui().await;
        self.next_status().await;
        link
    }
}

/// A printer at `00:11:22:33:44:<suffix>`.
pub fn printer(suffix: u8, name: &str) -> DeviceHandle {
    DeviceHandle::new(format!("00:11:22:33:44:{:02X}", suffix), name)
}
