//! The transport layer: a framed, full-duplex byte stream (serial or TCP)
//! driven on its own thread with its own Tokio runtime, exposing a plain
//! synchronous send/receive surface to the rest of the crate. This mirrors
//! `Broker::from_path`/`Broker::new` from the INSTEON driver this crate is
//! descended from, generalized from a single serial-only constructor to
//! serial, TCP client, and TCP server transports sharing one event loop.

pub mod serial;
pub mod tcp;

use std::sync::mpsc::channel as std_channel;
use std::thread;

use bytes::{Bytes, BytesMut};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::future::FutureExt;
use futures::select;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::error::{Error, Result};
use crate::frame::ByteStuffCodec;
use crate::packet::Packet;

/// Combines the byte-stuffing framer with [Packet] (de)serialization into a
/// single `tokio_util` codec, so the broker's `Framed` stream speaks
/// `Packet` directly.
#[derive(Debug, Default)]
pub struct PacketCodec {
    inner: ByteStuffCodec,
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Packet>, Error> {
        match self.inner.decode(src)? {
            Some(frame) => Ok(Some(Packet::from_bytes(&frame)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> std::result::Result<(), Error> {
        let bytes: Bytes = item.to_bytes().freeze();
        self.inner.encode(bytes, dst)
    }
}

enum BrokerMessage {
    Send(Packet),
    Close,
}

async fn event_loop<T>(
    mut framed: Framed<T, PacketCodec>,
    mut control: UnboundedReceiver<BrokerMessage>,
    mut incoming: UnboundedSender<Packet>,
    tx_delay: Option<std::time::Duration>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        select! {
            maybe_pkt = framed.next().fuse() => match maybe_pkt {
                Some(Ok(pkt)) => {
                    debug!("rx packet type={:#04x}", pkt.header.ty);
                    if incoming.send(pkt).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("transport decode error: {}", e);
                }
                None => {
                    debug!("transport stream closed");
                    break;
                }
            },
            msg = control.next() => match msg {
                Some(BrokerMessage::Send(pkt)) => {
                    if let Err(e) = framed.send(pkt).await {
                        warn!("transport send error: {}", e);
                    } else if let Some(delay) = tx_delay {
                        tokio::time::sleep(delay).await;
                    }
                }
                Some(BrokerMessage::Close) | None => break,
            },
        }
    }
}

/// A connected, framed byte transport running on a dedicated thread.
///
/// `send` is fire-and-forget at this layer: ahoi has no request/response
/// framing of its own, so matching a reply to a request is the [Modem]'s
/// job (it watches the incoming stream and polls a flag), not the
/// transport's.
pub struct Transport {
    control: UnboundedSender<BrokerMessage>,
    incoming: std::sync::Mutex<Option<UnboundedReceiver<Packet>>>,
}

impl Transport {
    /// Runs `init` on the transport's own runtime before entering the
    /// event loop, for constructors (serial open, TCP connect/accept) that
    /// need an async setup step. Blocks the calling thread until `init`
    /// resolves, via a one-shot std channel back from the spawned thread.
    /// `tx_delay`, if set, is slept after every successful send — the
    /// serial transport's `txDelay`; TCP transports pass `None`.
    fn spawn_with_init<T, F, Fut>(
        tx_delay: Option<std::time::Duration>,
        init: F,
    ) -> Result<Transport>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = std::io::Result<T>> + Send,
    {
        let (control_tx, control_rx) = unbounded();
        let (incoming_tx, incoming_rx) = unbounded();
        let (ready_tx, ready_rx) = std_channel();

        thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to start transport runtime");
            rt.block_on(async move {
                match init().await {
                    Ok(io) => {
                        ready_tx.send(Ok(())).ok();
                        let framed = Framed::new(io, PacketCodec::default());
                        event_loop(framed, control_rx, incoming_tx, tx_delay).await;
                    }
                    Err(e) => {
                        ready_tx.send(Err(e)).ok();
                    }
                }
            });
        });

        ready_rx.recv().map_err(|_| Error::Disconnected)??;
        Ok(Transport {
            control: control_tx,
            incoming: std::sync::Mutex::new(Some(incoming_rx)),
        })
    }

    /// Sends a packet. Does not wait for it to actually go out; queuing
    /// failure (the event loop already exited) is the only reported error.
    pub fn send(&self, pkt: Packet) -> Result<()> {
        self.control
            .unbounded_send(BrokerMessage::Send(pkt))
            .map_err(|_| Error::Disconnected)
    }

    /// Takes ownership of the incoming-packet stream. Can only be called
    /// once; the [Modem]'s receive loop is the sole consumer.
    pub fn take_incoming(&self) -> Option<UnboundedReceiver<Packet>> {
        self.incoming.lock().unwrap().take()
    }

    pub fn close(&self) {
        let _ = self.control.unbounded_send(BrokerMessage::Close);
    }

    /// Wraps an already-connected duplex byte stream as a transport,
    /// mirroring the teacher's `Broker::new(handle)` constructor. Used to
    /// drive the modem/image-transfer stack over an in-memory pipe in
    /// tests, without a real serial port or socket.
    pub fn from_io<T>(io: T, tx_delay: Option<std::time::Duration>) -> Result<Transport>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Transport::spawn_with_init(tx_delay, move || async move { Ok(io) })
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Lists available serial ports and prompts on stdin for a selection,
/// mirroring `ModemBaseCom.scanAndSelect` — the interactive fallback when
/// the connection-string is empty.
pub fn scan_and_select() -> Result<String> {
    use std::io::{BufRead, Write};

    let ports = Transport::scan_serial_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Err(Error::Disconnected);
    }

    println!("Available serial ports:");
    for (i, port) in ports.iter().enumerate() {
        println!("  [{}] {}", i, port);
    }
    print!("Select a port: ");
    std::io::stdout().flush().ok();

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let idx: usize = line.trim().parse().map_err(|_| Error::Parse)?;
    ports.into_iter().nth(idx).ok_or(Error::Parse)
}
