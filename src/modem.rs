//! The modem driver: connects to a transport, assigns sequence numbers,
//! dispatches received packets to callbacks/handlers, and offers the
//! ~40-command catalog plus optional blocking request/response semantics.
//! Mirrors `ahoi.modem.modem.Modem`.

use std::process::Command as Process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::executor::block_on;
use futures::channel::mpsc::UnboundedReceiver;
use futures::stream::StreamExt;
use log::warn;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::packet::{make_packet, Address, Packet};
use crate::pktlog::PacketLog;
use crate::transport::Transport;

/// The default duration to wait for a command response when blocking mode
/// is on. One second, matching `Modem.timeout`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll interval for the blocking-wait loop. 10ms, matching the
/// `time.sleep(10e-3)` poll in `__sendPacket`.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A handler object notified of every received packet, the Rust analogue
/// of a Python `rxHandler` with a `handlePkt` method.
pub trait PacketHandler: Send + Sync {
    fn handle_packet(&self, pkt: &Packet);
}

type RxCallback = Box<dyn Fn(&Packet) + Send + Sync>;

struct Shared {
    blocking: AtomicBool,
    waiting: AtomicBool,
    echo_tx: AtomicBool,
    echo_rx: AtomicBool,
    seq_number: Mutex<u8>,
    callbacks: Mutex<Vec<RxCallback>>,
    handlers: Mutex<Vec<Arc<dyn PacketHandler>>>,
    log: Mutex<PacketLog>,
}

impl Default for Shared {
    fn default() -> Self {
        Shared {
            blocking: AtomicBool::new(false),
            waiting: AtomicBool::new(false),
            echo_tx: AtomicBool::new(false),
            echo_rx: AtomicBool::new(false),
            seq_number: Mutex::new(0),
            callbacks: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            log: Mutex::new(PacketLog::new()),
        }
    }
}

/// The ahoi modem driver.
pub struct Modem {
    transport: Transport,
    shared: Arc<Shared>,
    timeout: Duration,
    serial_path: Option<String>,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Modem {
    /// Connects to the modem. `dev` is a serial device path (e.g.
    /// `/dev/ttyUSB0`), `tcp@host[:port]` for a modem-over-TCP forwarder, or
    /// empty to interactively scan and select a serial port.
    pub fn connect(dev: &str) -> Result<Modem> {
        let (transport, serial_path) = if dev.is_empty() {
            let selected = crate::transport::scan_and_select()?;
            (Transport::open_serial(&selected)?, Some(selected))
        } else if let Some(rest) = dev.strip_prefix("tcp@") {
            let mut parts = rest.splitn(2, ':');
            let host = parts.next().unwrap_or("").to_string();
            let port = parts.next().and_then(|p| p.parse::<u16>().ok());
            (Transport::connect_tcp(host, port)?, None)
        } else {
            (Transport::open_serial(dev)?, Some(dev.to_string()))
        };

        Ok(Modem {
            transport,
            shared: Arc::new(Shared::default()),
            timeout: DEFAULT_TIMEOUT,
            serial_path,
            rx_thread: Mutex::new(None),
        })
    }

    /// Wraps an already-established [Transport], for embedders that drive
    /// their own byte pipe (or tests using an in-memory duplex).
    pub fn from_transport(transport: Transport) -> Modem {
        Modem {
            transport,
            shared: Arc::new(Shared::default()),
            timeout: DEFAULT_TIMEOUT,
            serial_path: None,
            rx_thread: Mutex::new(None),
        }
    }

    /// Connects to a modem-over-TCP forwarder already acting as a server
    /// (i.e. this host dials out).
    pub fn connect_tcp(host: impl Into<String>, port: Option<u16>) -> Result<Modem> {
        Ok(Modem {
            transport: Transport::connect_tcp(host, port)?,
            shared: Arc::new(Shared::default()),
            timeout: DEFAULT_TIMEOUT,
            serial_path: None,
            rx_thread: Mutex::new(None),
        })
    }

    /// Starts receiving packets, dispatching each to registered callbacks
    /// and handlers. If `thread` is true this runs on a background thread
    /// and returns immediately; otherwise it blocks the calling thread
    /// until the transport's incoming stream ends.
    pub fn receive(&self, thread: bool) -> Result<()> {
        let mut incoming = self
            .transport
            .take_incoming()
            .ok_or(Error::Disconnected)?;
        let shared = Arc::clone(&self.shared);

        if thread {
            *self.rx_thread.lock().unwrap() = Some(thread::spawn(move || {
                run_receive_loop(&mut incoming, &shared);
            }));
            Ok(())
        } else {
            run_receive_loop(&mut incoming, &shared);
            Ok(())
        }
    }

    pub fn set_mode_blocking(&self, blocking: bool) {
        self.shared.blocking.store(blocking, Ordering::SeqCst);
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn set_tx_echo(&self, echo: bool) {
        self.shared.echo_tx.store(echo, Ordering::SeqCst);
    }

    pub fn set_rx_echo(&self, echo: bool) {
        self.shared.echo_rx.store(echo, Ordering::SeqCst);
    }

    pub fn add_rx_callback(&self, cb: impl Fn(&Packet) + Send + Sync + 'static) {
        self.shared.callbacks.lock().unwrap().push(Box::new(cb));
    }

    pub fn add_rx_handler(&self, handler: Arc<dyn PacketHandler>) {
        self.shared.handlers.lock().unwrap().push(handler);
    }

    pub fn remove_rx_handler(&self, handler: &Arc<dyn PacketHandler>) {
        self.shared
            .handlers
            .lock()
            .unwrap()
            .retain(|h| !Arc::ptr_eq(h, handler));
    }

    pub fn log_on(&self, path: impl AsRef<std::path::Path>) {
        self.shared.log.lock().unwrap().log_on(path);
    }

    pub fn log_off(&self) {
        self.shared.log.lock().unwrap().log_off();
    }

    /// Sends a raw packet, assigning the next sequence number unless `dsn`
    /// is given explicitly. Blocks if blocking mode is enabled and the
    /// packet is a command packet (`type >= 0x80`).
    pub fn send(
        &self,
        src: Address,
        dst: Address,
        ty: u8,
        status: u8,
        payload: Bytes,
        dsn: Option<u8>,
    ) -> Result<()> {
        let mut seq = self.shared.seq_number.lock().unwrap();
        let dsn = dsn.unwrap_or(*seq);
        let pkt = make_packet(src, dst, ty, status, dsn, payload);
        *seq = seq.wrapping_add(1);
        drop(seq);
        self.send_packet(pkt)
    }

    /// Sends one of the catalog [Command]s to the broadcast address from
    /// address 0, the way every `Modem.<command>()` convenience method
    /// does upstream.
    pub fn send_command(&self, cmd: &Command) -> Result<()> {
        self.send(
            Address(0),
            Address::BROADCAST,
            cmd.type_byte(),
            0,
            cmd.payload()?,
            None,
        )
    }

    /// Deprecated alias for [Command::BitSpread], kept for wire/API parity
    /// with the upstream modem driver's `spreadCode`, itself marked
    /// deprecated there in favor of `bitSpread`.
    #[deprecated(note = "use send_command(&Command::BitSpread(..)) instead")]
    pub fn spread_code(&self, chips: Option<u8>) -> Result<()> {
        self.send_command(&Command::BitSpread(chips))
    }

    fn send_packet(&self, pkt: Packet) -> Result<()> {
        if self.shared.echo_tx.load(Ordering::SeqCst) {
            println!("TX@{} {}", unix_timestamp(), pkt.to_hex_string());
        }

        let is_cmd = pkt.is_cmd_type();
        self.transport.send(pkt)?;

        if self.shared.blocking.load(Ordering::SeqCst) && is_cmd {
            self.shared.waiting.store(true, Ordering::SeqCst);
            let deadline = Instant::now() + self.timeout;
            while Instant::now() < deadline && self.shared.waiting.load(Ordering::SeqCst) {
                thread::sleep(POLL_INTERVAL);
            }
            if self.shared.waiting.load(Ordering::SeqCst) {
                warn!("timeout waiting for response");
                return Err(Error::Timeout);
            }
        }

        Ok(())
    }

    /// Flashes a new firmware image via `stm32flash`. Only supported over
    /// a serial connection: the bootloader passthrough needs exclusive
    /// access to the UART.
    ///
    /// The port is reacquired and a `reset` issued on every way out of this
    /// function once the port has been released for flashing — success,
    /// a failure to spawn `stm32flash`, or a non-zero exit — matching
    /// `Modem.program`'s `reconnect()`/`reset()` on every branch.
    pub fn program(&mut self, image: &std::path::Path, empty: bool) -> Result<()> {
        let dev = self
            .serial_path
            .clone()
            .ok_or(Error::ProgrammingRequiresSerial)?;

        if !image.is_file() {
            return Err(Error::ProgrammingFailed(format!(
                "firmware image '{}' does not exist",
                image.display()
            )));
        }

        if !empty {
            self.send_command(&Command::StartBootloader)?;
        }

        self.transport.close();

        let flash_result = Process::new("stm32flash")
            .args([
                "-w",
                &image.to_string_lossy(),
                "-v",
                "-R",
                "-b",
                "115200",
                &dev,
            ])
            .status()
            .map_err(|e| Error::ProgrammingFailed(e.to_string()))
            .and_then(|status| {
                if status.success() {
                    Ok(())
                } else {
                    Err(Error::ProgrammingFailed(format!(
                        "stm32flash exited with {}",
                        status
                    )))
                }
            });

        self.transport = Transport::open_serial(dev)?;
        if let Err(e) = self.send_command(&Command::Reset) {
            warn!("reset after programming was not acknowledged: {}", e);
        }

        flash_result
    }
}

fn run_receive_loop(incoming: &mut UnboundedReceiver<Packet>, shared: &Arc<Shared>) {
    while let Some(pkt) = block_on(incoming.next()) {
        if shared.echo_rx.load(Ordering::SeqCst) {
            println!("RX@{} {}", unix_timestamp(), pkt.to_hex_string());
        }

        shared.log.lock().unwrap().log(&pkt);

        // unblock any pending send()
        shared.waiting.store(false, Ordering::SeqCst);

        for cb in shared.callbacks.lock().unwrap().iter() {
            let pkt_ref = &pkt;
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(pkt_ref)))
            {
                report_listener_panic(e);
            }
        }
        for handler in shared.handlers.lock().unwrap().iter() {
            let handler = Arc::clone(handler);
            let pkt_ref = &pkt;
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler.handle_packet(pkt_ref)
            })) {
                report_listener_panic(e);
            }
        }
    }
}

/// No exception escapes a listener: a panicking callback or handler is
/// caught and reported on stderr, the receive thread keeps running.
fn report_listener_panic(e: Box<dyn std::any::Any + Send>) {
    let msg = e
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| e.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "listener panicked".to_string());
    eprintln!("packet listener panicked: {}", msg);
}

fn unix_timestamp() -> f64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_serial_path_errors() {
        assert!(Modem::connect("/this/does/not/exist").is_err());
    }
}
