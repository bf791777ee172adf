/// Errors returned from various operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure to parse a [Packet](crate::packet::Packet) or framed byte stream.
    #[error("malformed packet")]
    Parse,

    /// An operation took too long to complete.
    #[error("operation timed out")]
    Timeout,

    /// An unexpected response was received.
    #[error("unexpected response received")]
    UnexpectedResponse,

    /// The modem was disconnected.
    #[error("modem was disconnected")]
    Disconnected,

    /// A reliable send exhausted its retransmission budget without an ACK.
    #[error("max number of retransmissions reached")]
    MaxRetransmissions,

    /// `peakWinLen` was given a value greater than the modem's maximum.
    #[error("peak window length exceeds the modem maximum")]
    PeakWinLenOutOfRange,

    /// `testSound` was given a duration outside `[1, 250]`.
    #[error("test sound duration out of range")]
    TestSoundDurationOutOfRange,

    /// `sample` was called without all of `trigger`, `num`, and `post`.
    #[error("sample command is missing required fields")]
    SampleMissingFields,

    /// `testNoise` was given a `step` or `dur` less than 1.
    #[error("testNoise requires step >= 1 and dur >= 1")]
    TestNoiseOutOfRange,

    /// `program()` was called on a non-serial transport.
    #[error("firmware programming is only supported over a serial transport")]
    ProgrammingRequiresSerial,

    /// The flashing subprocess could not be spawned or returned non-zero.
    #[error("firmware flashing tool failed: {0}")]
    ProgrammingFailed(String),

    /// JPEG encoding or decoding failed.
    #[error("image error: {0}")]
    Image(String),
}

impl From<futures::channel::mpsc::SendError> for Error {
    fn from(_: futures::channel::mpsc::SendError) -> Error {
        Error::Disconnected
    }
}

pub type Result<T> = std::result::Result<T, Error>;
