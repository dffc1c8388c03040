//! # BLE Transport
//!
//! NIIMBOT printers expose a single GATT characteristic for both directions:
//! writes go out as write-without-response and replies arrive as
//! notifications.
//!
//! | Item | UUID |
//! |------|------|
//! | Service | `e7810a71-73ae-499d-8c15-faa9aef0c3f2` |
//! | Characteristic | `bef8d6c9-9c21-4c9e-b632-bd58c1009f9f` |
//!
//! ## Sync/Async Bridge
//!
//! `btleplug` is async. The transport owns one worker thread running a
//! current-thread tokio runtime for the lifetime of the connection:
//!
//! ```text
//!   caller thread                      worker thread (tokio)
//!   ─────────────                      ─────────────────────
//!   write(data) ── Command::Write ──►  peripheral.write(..)
//!        ▲                                   │
//!        └──────── done (≤5s) ◄──────────────┘
//!
//!   read(max)  ◄── Arc<Mutex<Vec<u8>>> ◄── notification stream
//!   (sleep backoff, ≤5s)
//! ```
//!
//! Those two channels are the only state shared across the boundary.
//!
//! ## Connecting
//!
//! The address is either a MAC address or the platform's peripheral id
//! (a UUID on macOS). The adapter scans until a matching peripheral shows
//! up or [`CONNECT_TIMEOUT`] elapses. A printer that connects but lacks the
//! expected service or characteristic is a hard error.

use std::pin::Pin;
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::Transport;
use crate::error::{NiimbotError, Result};

/// Printer GATT service
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xe7810a71_73ae_499d_8c15_faa9aef0c3f2);

/// Read/notify/write characteristic inside [`SERVICE_UUID`]
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xbef8d6c9_9c21_4c9e_b632_bd58c1009f9f);

/// How long to scan for and connect to the printer
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time `read` waits for the first notification byte
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on waiting for the worker to finish a write
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between adapter polls while scanning
const SCAN_POLL: Duration = Duration::from_millis(500);

/// Longest sleep in the read backoff loop
const MAX_READ_BACKOFF: Duration = Duration::from_millis(50);

type Inbound = Arc<Mutex<Vec<u8>>>;
type Notifications = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// Request from the caller thread to the worker
enum Command {
    Write {
        data: Vec<u8>,
        done: SyncSender<Result<()>>,
    },
    Close {
        done: SyncSender<()>,
    },
}

/// BLE connection to a printer
pub struct BleTransport {
    address: String,
    inbound: Inbound,
    commands: Option<UnboundedSender<Command>>,
    worker: Option<JoinHandle<()>>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl BleTransport {
    /// Scan for the printer, connect and subscribe to its notifications.
    ///
    /// Blocks until the worker reports the connection is ready.
    pub fn connect(address: &str) -> Result<Self> {
        let inbound: Inbound = Arc::new(Mutex::new(Vec::new()));
        let (commands_tx, commands_rx) = unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);

        let worker = {
            let address = address.to_string();
            let inbound = Arc::clone(&inbound);
            thread::Builder::new()
                .name("niimbot-ble".to_string())
                .spawn(move || run_worker(address, inbound, commands_rx, ready_tx))?
        };

        // Scan and connect each get CONNECT_TIMEOUT; allow both plus discovery
        let ready_bound = CONNECT_TIMEOUT * 2 + WRITE_TIMEOUT;
        match ready_rx.recv_timeout(ready_bound) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(NiimbotError::Timeout(format!(
                    "BLE connection to {} not ready after {:?}",
                    address, ready_bound
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                return Err(NiimbotError::Transport(
                    "BLE worker exited during connect".to_string(),
                ));
            }
        }

        info!("Connected to {} over BLE", address);
        Ok(Self::from_parts(address, inbound, commands_tx, worker))
    }

    fn from_parts(
        address: &str,
        inbound: Inbound,
        commands: UnboundedSender<Command>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            address: address.to_string(),
            inbound,
            commands: Some(commands),
            worker: Some(worker),
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Change how long `read` waits for data.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    fn worker_alive(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn take_inbound(&self, max_len: usize) -> Result<Vec<u8>> {
        let mut buffer = self
            .inbound
            .lock()
            .map_err(|_| NiimbotError::Transport("BLE inbound buffer poisoned".to_string()))?;
        let n = max_len.min(buffer.len());
        Ok(buffer.drain(..n).collect())
    }
}

impl Transport for BleTransport {
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        if self.commands.is_none() {
            return Err(NiimbotError::Closed);
        }

        let deadline = Instant::now() + self.read_timeout;
        let mut backoff = Duration::from_millis(1);
        loop {
            let data = self.take_inbound(max_len)?;
            if !data.is_empty() {
                trace!("read {} bytes: {}", data.len(), hex::encode(&data));
                return Ok(data);
            }
            if !self.worker_alive() {
                return Err(NiimbotError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(NiimbotError::Timeout(format!(
                    "No BLE notification within {:?}",
                    self.read_timeout
                )));
            }
            thread::sleep(backoff.min(deadline - now));
            backoff = (backoff * 2).min(MAX_READ_BACKOFF);
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let commands = self.commands.as_ref().ok_or(NiimbotError::Closed)?;
        trace!("write {} bytes: {}", data.len(), hex::encode(data));

        let (done_tx, done_rx) = std_mpsc::sync_channel(1);
        commands
            .send(Command::Write {
                data: data.to_vec(),
                done: done_tx,
            })
            .map_err(|_| NiimbotError::Closed)?;

        match done_rx.recv_timeout(self.write_timeout) {
            Ok(result) => result.map(|()| data.len()),
            Err(RecvTimeoutError::Timeout) => Err(NiimbotError::Timeout(format!(
                "BLE write not completed within {:?}",
                self.write_timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(NiimbotError::Closed),
        }
    }

    fn close(&mut self) -> Result<()> {
        let Some(commands) = self.commands.take() else {
            return Ok(());
        };
        debug!("Closing BLE connection to {}", self.address);

        let (done_tx, done_rx) = std_mpsc::sync_channel(1);
        let acknowledged = commands.send(Command::Close { done: done_tx }).is_ok()
            && done_rx.recv_timeout(self.write_timeout).is_ok();

        if let Some(worker) = self.worker.take() {
            if acknowledged || worker.is_finished() {
                let _ = worker.join();
            } else {
                warn!("BLE worker did not acknowledge close; detaching it");
            }
        }
        Ok(())
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// ============================================================================
// WORKER
// ============================================================================

fn ble_error(context: &str, err: btleplug::Error) -> NiimbotError {
    NiimbotError::Transport(format!("{}: {}", context, err))
}

/// Worker thread body: own the runtime, connect, then serve the channels.
fn run_worker(
    address: String,
    inbound: Inbound,
    commands: UnboundedReceiver<Command>,
    ready: SyncSender<Result<()>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(NiimbotError::Io(e)));
            return;
        }
    };

    runtime.block_on(async move {
        match Session::open(&address).await {
            Ok(session) => {
                if ready.send(Ok(())).is_err() {
                    // Caller gave up waiting
                    disconnect(&session.peripheral, &session.characteristic).await;
                    return;
                }
                session.serve(inbound, commands).await;
            }
            Err(e) => {
                let _ = ready.send(Err(e));
            }
        }
    });
}

/// A connected, subscribed peripheral
struct Session {
    peripheral: Peripheral,
    characteristic: Characteristic,
    notifications: Notifications,
}

impl Session {
    async fn open(address: &str) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|e| ble_error("BLE manager init failed", e))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| ble_error("Failed to list BLE adapters", e))?
            .into_iter()
            .next()
            .ok_or_else(|| NiimbotError::Transport("No BLE adapter found".to_string()))?;

        let peripheral = find_peripheral(&adapter, address).await?;

        debug!("Connecting to {}", address);
        match tokio::time::timeout(CONNECT_TIMEOUT, peripheral.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ble_error("Failed to connect", e)),
            Err(_) => {
                let _ = peripheral.disconnect().await;
                return Err(NiimbotError::Timeout(format!(
                    "BLE connect to {} timed out",
                    address
                )));
            }
        }

        match Self::subscribe(peripheral.clone()).await {
            Ok(session) => Ok(session),
            Err(e) => {
                let _ = peripheral.disconnect().await;
                Err(e)
            }
        }
    }

    async fn subscribe(peripheral: Peripheral) -> Result<Self> {
        peripheral
            .discover_services()
            .await
            .map_err(|e| ble_error("Failed to discover services", e))?;

        if !peripheral.services().iter().any(|s| s.uuid == SERVICE_UUID) {
            return Err(NiimbotError::Transport(format!(
                "Printer does not expose service {}",
                SERVICE_UUID
            )));
        }
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == SERVICE_UUID && c.uuid == CHARACTERISTIC_UUID)
            .ok_or_else(|| {
                NiimbotError::Transport(format!(
                    "Printer does not expose characteristic {}",
                    CHARACTERISTIC_UUID
                ))
            })?;

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(|e| ble_error("Failed to subscribe to notifications", e))?;
        let notifications = peripheral
            .notifications()
            .await
            .map_err(|e| ble_error("Failed to open notification stream", e))?;

        Ok(Self {
            peripheral,
            characteristic,
            notifications,
        })
    }

    /// Forward notifications into `inbound` and execute commands until
    /// closed or the caller goes away.
    async fn serve(mut self, inbound: Inbound, mut commands: UnboundedReceiver<Command>) {
        let mut stream_open = true;
        loop {
            tokio::select! {
                notification = self.notifications.next(), if stream_open => match notification {
                    Some(n) if n.uuid == CHARACTERISTIC_UUID => {
                        trace!("notification {} bytes", n.value.len());
                        if let Ok(mut buffer) = inbound.lock() {
                            buffer.extend_from_slice(&n.value);
                        }
                    }
                    Some(_) => {}
                    None => {
                        debug!("BLE notification stream ended");
                        stream_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(Command::Write { data, done }) => {
                        let result = self
                            .peripheral
                            .write(&self.characteristic, &data, WriteType::WithoutResponse)
                            .await
                            .map_err(|e| ble_error("BLE write failed", e));
                        let _ = done.send(result);
                    }
                    Some(Command::Close { done }) => {
                        disconnect(&self.peripheral, &self.characteristic).await;
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        disconnect(&self.peripheral, &self.characteristic).await;
                        return;
                    }
                },
            }
        }
    }

}

async fn disconnect(peripheral: &Peripheral, characteristic: &Characteristic) {
    let _ = peripheral.unsubscribe(characteristic).await;
    if let Err(e) = peripheral.disconnect().await {
        debug!("BLE disconnect failed: {}", e);
    }
}

/// Does a peripheral with this id/MAC answer to `address`?
fn matches_address(address: &str, id: &str, mac: Option<&str>) -> bool {
    id.eq_ignore_ascii_case(address) || mac.is_some_and(|m| m.eq_ignore_ascii_case(address))
}

async fn find_peripheral(adapter: &Adapter, address: &str) -> Result<Peripheral> {
    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(|e| ble_error("Failed to start BLE scan", e))?;
    info!("Scanning for {}", address);

    let deadline = tokio::time::Instant::now() + CONNECT_TIMEOUT;
    let found = loop {
        let peripherals = adapter
            .peripherals()
            .await
            .map_err(|e| ble_error("Failed to list peripherals", e))?;

        let mut hit = None;
        for peripheral in peripherals {
            let id = peripheral.id().to_string();
            let mac = peripheral
                .properties()
                .await
                .ok()
                .flatten()
                .map(|p| p.address.to_string());
            if matches_address(address, &id, mac.as_deref()) {
                hit = Some(peripheral);
                break;
            }
        }
        if hit.is_some() || tokio::time::Instant::now() >= deadline {
            break hit;
        }
        tokio::time::sleep(SCAN_POLL).await;
    };

    let _ = adapter.stop_scan().await;
    found.ok_or_else(|| {
        NiimbotError::Timeout(format!(
            "BLE device {} not found within {:?}",
            address, CONNECT_TIMEOUT
        ))
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Transport wired to a fake worker that echoes writes back as
    /// notifications.
    fn echo_transport() -> BleTransport {
        let inbound: Inbound = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = unbounded_channel::<Command>();
        let worker_inbound = Arc::clone(&inbound);
        let worker = thread::spawn(move || {
            while let Some(command) = rx.blocking_recv() {
                match command {
                    Command::Write { data, done } => {
                        worker_inbound.lock().unwrap().extend_from_slice(&data);
                        let _ = done.send(Ok(()));
                    }
                    Command::Close { done } => {
                        let _ = done.send(());
                        return;
                    }
                }
            }
        });
        BleTransport::from_parts("26:03:03:C3:F9:11", inbound, tx, worker)
    }

    #[test]
    fn test_uuids() {
        assert_eq!(
            SERVICE_UUID.to_string(),
            "e7810a71-73ae-499d-8c15-faa9aef0c3f2"
        );
        assert_eq!(
            CHARACTERISTIC_UUID.to_string(),
            "bef8d6c9-9c21-4c9e-b632-bd58c1009f9f"
        );
    }

    #[test]
    fn test_write_waits_for_completion() {
        let mut transport = echo_transport();
        assert_eq!(transport.write(&[1, 2, 3]).unwrap(), 3);
        // Completion implies the notification already landed
        assert_eq!(transport.read(2).unwrap(), vec![1, 2]);
        assert_eq!(transport.read(10).unwrap(), vec![3]);
    }

    #[test]
    fn test_read_times_out_without_notifications() {
        let mut transport = echo_transport();
        transport.set_read_timeout(Duration::from_millis(20));
        assert!(matches!(transport.read(10), Err(NiimbotError::Timeout(_))));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut transport = echo_transport();
        transport.close().unwrap();
        transport.close().unwrap();
        assert!(matches!(transport.write(&[1]), Err(NiimbotError::Closed)));
        assert!(matches!(transport.read(1), Err(NiimbotError::Closed)));
    }

    #[test]
    fn test_matches_address() {
        assert!(matches_address(
            "26:03:03:c3:f9:11",
            "hci0/dev_26_03_03_C3_F9_11",
            Some("26:03:03:C3:F9:11")
        ));
        assert!(matches_address(
            "E7810A71-73AE-499D-8C15-FAA9AEF0C3F2",
            "e7810a71-73ae-499d-8c15-faa9aef0c3f2",
            None
        ));
        assert!(!matches_address("00:00:00:00:00:00", "x", Some("11:11:11:11:11:11")));
    }
}
