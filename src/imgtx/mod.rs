//! Reliable image transfer over the ahoi link: JFIF splitting, image
//! capture, progress reporting, and the stop-and-wait transfer engine that
//! ties them to a [Modem](crate::modem::Modem).

pub mod camera;
pub mod engine;
pub mod jfif;
pub mod sink;

pub use camera::{Capture, DebugCapture};
pub use engine::{ImageTxEngine, PktStat};
pub use jfif::JfifSplitter;
pub use sink::{NullSink, ProgressSink};
