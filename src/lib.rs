#![recursion_limit = "256"]

//! A host driver for the ahoi acoustic underwater modem: link-layer
//! framing, the packet wire format, serial/TCP transports, the modem
//! command catalog, and a reliable stop-and-wait image transfer engine
//! built on top of it.
//!
//! # Example
//! ```no_run
//! # use ahoi::{Modem, Command};
//! # use ahoi::Error;
//! # fn main() -> Result<(), Error> {
//! let modem = Modem::connect("/dev/ttyUSB0")?;
//! modem.receive(true)?;
//! modem.send_command(&Command::GetVersion)?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
mod constants;
mod error;
mod frame;
pub mod imgtx;
mod modem;
pub mod packet;
mod pktlog;
pub mod transport;

pub use command::Command;
pub use config::Config;
pub use error::{Error, Result};
pub use frame::ByteStuffCodec;
pub use imgtx::ImageTxEngine;
pub use modem::{Modem, PacketHandler};
pub use packet::{Address, AckKind, Footer, Header, Packet};
pub use pktlog::PacketLog;
pub use transport::Transport;
