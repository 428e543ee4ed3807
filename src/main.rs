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

//! Woosim Print Bridge
//!
//! Reads line-delimited JSON method calls on stdin, answers on stdout, and
//! pushes connection status updates to stdout as they happen.

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use woosim_print_bridge::bluetooth::BluezBackend;
use woosim_print_bridge::bridge::{MethodCall, PrinterBridge};
use woosim_print_bridge::config::Config;
use woosim_print_bridge::status::STATUS_METHOD;
use woosim_print_bridge::{ConnectionStatus, PrintService, StatusBridge, UiMessage};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("woosim_print_bridge=info".parse()?),
        )
        .init();

    info!(
        "Starting Woosim Print Bridge v{}...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::load()?;
    info!("Configuration loaded");

    let status = StatusBridge::global().clone();
    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<String>();
    status.set_listener(Some(status_tx));

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiMessage>();

    let backend = Arc::new(BluezBackend::new(config.bluetooth.service_uuid).await?);
    let service = PrintService::new(
        Handle::current(),
        backend.clone(),
        Arc::new(ui_tx),
        status.clone(),
        config.bluetooth.clone(),
    );
    service.start();

    let bridge = PrinterBridge::new(service.clone(), backend, status.clone());

    if let Some(address) = config.printer.default_address.clone() {
        let reply = bridge
            .call(MethodCall::ConnectToDeviceWithHandling {
                mac_address: Some(address),
            })
            .await;
        match reply {
            Ok(message) => info!("{}", message),
            Err(e) => warn!("Default printer: {}", e),
        }
    }

    info!("Ready.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = bridge.handle_json(&line).await?;
                stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
                stdout.flush().await?;
            }
            Some(payload) = status_rx.recv() => {
                log_status(&payload);
                let event = serde_json::json!({ "method": STATUS_METHOD, "args": payload });
                stdout.write_all(format!("{}\n", event).as_bytes()).await?;
                stdout.flush().await?;
            }
            Some(message) = ui_rx.recv() => log_ui_message(&message),
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    service.stop();
    if status.has_listener() {
        debug!("Tearing down status listener");
        status.set_listener(None);
    }
    info!("Woosim Print Bridge stopped");
    Ok(())
}

fn log_status(payload: &str) {
    match payload.parse::<ConnectionStatus>() {
        Ok(ConnectionStatus::Connected(name)) => info!("Printer status: connected to {}", name),
        Ok(status) => warn!("Printer status: {}", status),
        Err(e) => warn!("{}", e),
    }
}

fn log_ui_message(message: &UiMessage) {
    match message {
        UiMessage::DeviceName(name) => info!("Connected to {}", name),
        UiMessage::Read { bytes, data } => debug!("Printer sent {} bytes: {:02X?}", bytes, data),
        UiMessage::Toast(toast) => warn!("{}", toast.message()),
    }
}
