//! The error taxonomy surfaced to callers.

use core::fmt;

/// Everything that can go wrong in this crate.
///
/// Every other recoverable condition (at-capacity insert, backspace at
/// the start of the line, history load past the oldest entry, an
/// unrecognized CSI final byte, 8-bit input) is a silent no-op, never
/// an [`Error`] — see spec.md §7.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// [`crate::Session::init`] was called with a null/zero-sized
    /// prompt or, when history is configured, a null history buffer.
    NullConfig,
    /// The line buffer passed to [`crate::Session::read_line`] is not
    /// larger than the 5 bytes reserved for the header and terminator.
    BufferTooSmall,
    /// The configured history capacity is not a power of two, or is
    /// smaller than 2.
    HistoryNotPowerOfTwo,
    /// [`crate::transport::Transport::write`] returned fewer bytes
    /// than requested. Only ever produced when the `debug-checks`
    /// feature is enabled; otherwise partial writes are tolerated.
    TransportWrite,
    /// A byte sequence following `ESC` did not form a recognized
    /// CSI/SS3/alt escape sequence.
    ParseError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// A short, static description, in the style of an errno string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Error::NullConfig => "missing required configuration",
            Error::BufferTooSmall => "line buffer too small",
            Error::HistoryNotPowerOfTwo => "history capacity must be a power of two >= 2",
            Error::TransportWrite => "transport write was short",
            Error::ParseError => "malformed escape sequence",
        }
    }
}

impl core::error::Error for Error {}

/// Shorthand for `Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;
