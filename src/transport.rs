//! The byte-oriented transport a [`crate::Session`] talks through.
//!
//! This stands in for the two blocking callbacks (`read_bytes`,
//! `write_bytes`) an embedded caller would otherwise hand over as raw
//! function pointers plus an opaque context. A trait lets a concrete
//! implementation close over whatever state (a UART register block, an
//! in-memory queue for tests) that context pointer would have held.

/// A synchronous, blocking byte channel to the terminal.
///
/// Both methods are expected to be synchronous: [`Transport::read`]
/// blocks until at least one byte is available and returns the number
/// of bytes actually read (at most `buf.len()`); [`Transport::write`]
/// attempts to transfer all of `buf` and returns the number of bytes
/// actually written. Neither method is ever called concurrently with
/// itself or the other by [`crate::Session`].
pub trait Transport {
    /// Blocks until at least one byte is available, then reads up to
    /// `buf.len()` bytes into `buf`. Returns the number of bytes read.
    fn read(&mut self, buf: &mut [u8]) -> u16;

    /// Attempts to write all of `buf`. Returns the number of bytes
    /// actually written, which may be less than `buf.len()` on a
    /// partial transfer.
    fn write(&mut self, buf: &[u8]) -> u16;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> u16 {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> u16 {
        (**self).write(buf)
    }
}

/// Busy-polls [`Transport::read`] with a one-byte buffer until it
/// returns 1, per spec.md §5's "the driver polls with a busy loop"
/// contract.
pub(crate) fn read_one_byte<T: Transport + ?Sized>(transport: &mut T) -> u8 {
    let mut byte = [0u8; 1];
    loop {
        if transport.read(&mut byte) == 1 {
            return byte[0];
        }
    }
}

/// Writes `buf` in a single [`Transport::write`] call. The write is
/// expected to transfer the whole buffer atomically (spec.md §5); a
/// short write is surfaced as [`crate::error::Error::TransportWrite`]
/// only when the `debug-checks` feature is enabled, and otherwise
/// silently tolerated, per spec.md §7.
pub(crate) fn write_checked<T: Transport + ?Sized>(
    transport: &mut T,
    buf: &[u8],
) -> crate::error::Result<()> {
    let n = transport.write(buf);
    if cfg!(feature = "debug-checks") && (n as usize) < buf.len() {
        return Err(crate::error::Error::TransportWrite);
    }
    Ok(())
}
