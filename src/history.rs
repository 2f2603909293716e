//! Component E: the history ring.
//!
//! A fixed-capacity, power-of-two, reverse-packed ring buffer of past
//! lines, grounded on `original_source/vln.c`'s `vln_history_cache`/
//! `vln_history_store`/`vln_history_load`/`vln_rvsememcpy4`/
//! `vln_align4`. Records are stored word-reversed so that a record's
//! `size` header always lands in the last 4-byte word of its slot,
//! which is what lets [`HistoryRing::load`] walk the ring backward
//! from `in` without a separate index of record boundaries (spec.md §9).

use core::num::Wrapping;

use crate::error::{Error, Result};
use crate::line::LineBuffer;

/// Rounds `n` up to the next multiple of 4, matching the original's
/// `uint32_t`-widened `vln_align4` (the addition happens before the
/// truncation back to a slot size, so it overflows the same way the
/// original's `uint16_t lnsize = vln_align4(size + 4)` would for an
/// implausibly large `size`).
fn align_up_4(n: u32) -> u16 {
    (((n + 3) & !3) & 0xFFFF) as u16
}

/// Maps a byte position within a logical `nwords`-word region to its
/// word-reversed position: word `w` swaps with word `nwords - 1 - w`,
/// byte order within each word is preserved. This is its own inverse,
/// so the same function both stores a record (line buffer order ->
/// ring order) and loads one back (ring order -> line buffer order).
fn mirror(i: usize, nwords: usize) -> usize {
    let word = i / 4;
    let intra = i % 4;
    (nwords - 1 - word) * 4 + intra
}

/// A caller-supplied, power-of-two byte region holding committed
/// lines. `in`/`out`/`cache` are kept as [`Wrapping<u16>`] so the
/// modulo-65536 arithmetic spec.md §3/§8 describes ("Power-of-two
/// wrap") is explicit rather than relying on release-mode overflow.
#[derive(Debug)]
pub struct HistoryRing<'a> {
    buf: &'a mut [u8],
    mask: u16,
    cap: u16,
    head: Wrapping<u16>,
    tail: Wrapping<u16>,
    cache: Wrapping<u16>,
    index: u16,
}

impl<'a> HistoryRing<'a> {
    /// Wraps `buf` as a history ring. Requires a power-of-two length
    /// of at least 2 that fits in 16 bits.
    pub fn new(buf: &'a mut [u8]) -> Result<Self> {
        let cap = u16::try_from(buf.len()).map_err(|_| Error::HistoryNotPowerOfTwo)?;
        if cap < 2 || !cap.is_power_of_two() {
            return Err(Error::HistoryNotPowerOfTwo);
        }
        let mask = cap - 1;
        Ok(Self {
            buf,
            mask,
            cap,
            head: Wrapping(0),
            tail: Wrapping(0),
            cache: Wrapping(0),
            index: 0,
        })
    }

    #[must_use]
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Marks the current line as live again, as `read_line` does at
    /// the start of every call (spec.md §4.F step 1).
    pub fn reset_index(&mut self) {
        self.index = 0;
    }

    fn get_byte(&self, offset: Wrapping<u16>) -> u8 {
        self.buf[(offset.0 & self.mask) as usize]
    }

    fn put_byte(&mut self, offset: Wrapping<u16>, value: u8) {
        let idx = (offset.0 & self.mask) as usize;
        self.buf[idx] = value;
    }

    /// Reverse-copies the current contents of `line` into the ring at
    /// `self.cache`, evicting the oldest record(s) if necessary, and
    /// sets `in := cache + slot`. Shared by [`Self::commit_line`] (the
    /// caller's `cache` is also advanced, making the write permanent)
    /// and the transient live-line snapshot `load` takes before its
    /// first backward step (spec.md §4.E, "the exact same reverse-copy").
    fn store_at_cache(&mut self, line: &LineBuffer) {
        let raw = line.raw();
        let size = line.size();
        let slot = align_up_4(u32::from(size) + 4);
        let used = (self.cache - self.tail).0;
        let free = self.cap.wrapping_sub(used);
        if slot > free {
            self.tail += Wrapping(slot - free);
        }

        let record_start = self.cache;
        let nwords = (slot / 4) as usize;
        for i in 0..slot as usize {
            let byte = if i < raw.len() { raw[i] } else { 0 };
            let ring_pos = mirror(i, nwords);
            self.put_byte(record_start + Wrapping(ring_pos as u16), byte);
        }
        self.head = record_start + Wrapping(slot);
    }

    /// Commits `line` as a new, permanent history record. A zero-size
    /// line is not recorded.
    pub fn commit_line(&mut self, line: &LineBuffer) {
        if line.size() == 0 {
            return;
        }
        self.store_at_cache(line);
        self.cache = self.head;
    }

    fn load_record(&self, record_start: Wrapping<u16>, slot: u16, line: &mut LineBuffer) {
        let nwords = (slot / 4) as usize;
        let raw = line.raw_mut();
        for j in 0..slot as usize {
            let byte = self.get_byte(record_start + Wrapping(j as u16));
            let dest_pos = mirror(j, nwords);
            if dest_pos < raw.len() {
                raw[dest_pos] = byte;
            }
        }
    }

    /// Loads the `k`-th record back from the head into `line`.
    /// Returns `false` (a silent no-op, never an [`Error`]) if there
    /// is no such record -- at the oldest entry already, or the ring
    /// is empty/corrupt.
    pub fn load(&mut self, k: u16, line: &mut LineBuffer) -> bool {
        if self.index == 0 {
            self.store_at_cache(line);
        }

        let mut cursor = self.head;
        let mut slot = 0u16;
        let mut prev_used = (self.head - self.tail).0;

        for _ in 0..=k {
            cursor -= Wrapping(slot);
            let used = (cursor - self.tail).0;
            if used == 0 || used > prev_used {
                return false;
            }
            prev_used = used;

            let size_lo = self.get_byte(cursor - Wrapping(4));
            let size_hi = self.get_byte(cursor - Wrapping(4) + Wrapping(1));
            let size = u16::from_ne_bytes([size_lo, size_hi]);
            slot = align_up_4(u32::from(size) + 4);
            if slot > used {
                return false;
            }
        }

        let record_start = cursor - Wrapping(slot);
        self.load_record(record_start, slot, line);
        self.index = k;
        true
    }

    /// Loads the record one further back than the one currently
    /// loaded (spec.md §4.E).
    pub fn prev(&mut self, line: &mut LineBuffer) -> bool {
        self.load(self.index + 1, line)
    }

    /// Loads the record one closer to the live line (spec.md §4.E).
    pub fn next(&mut self, line: &mut LineBuffer) -> bool {
        let k = if self.index > 0 { self.index - 1 } else { 0 };
        self.load(k, line)
    }
}
