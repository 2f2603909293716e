//! Component G: terminal geometry and prompt-width tracking.
//!
//! A session starts out assuming a conservative default screen size
//! and no xterm capability, then refines both by sending a `CSI 18 t`
//! geometry probe and parsing whatever comes back (spec.md §4.G).
//! Everything here is plain state plus two stateless helpers; the
//! driver loop that decides *when* to call them lives in
//! [`crate::session`].

use crate::action::{dispatch, Action};
use crate::error::Result;
use crate::parse::parse;
use crate::seq;
use crate::transport::{write_checked, Transport};

/// Screen size assumed before detection ever runs or succeeds,
/// matching the original's `CFG_VLN_DEFROW`/`CFG_VLN_DEFCOL`.
pub const DEFAULT_ROWS: u16 = 20;
pub const DEFAULT_COLS: u16 = 80;

bitflags::bitflags! {
    /// Capability/state bits the session driver consults on every
    /// input iteration.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct TermFlags: u8 {
        /// Set once a `CSI 8;rows;cols t` reply has been parsed -- the
        /// terminal is known to understand the geometry probe.
        const SUPPORTED = 0x01;
        /// Set while the alternate screen buffer is active (the help
        /// excursion spec.md §4.C describes runs inside it).
        const ALT_ACTIVE = 0x02;
    }
}

/// The terminal geometry and capability state a [`crate::Session`]
/// tracks across the life of a line-edit call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TermState {
    pub rows: u16,
    pub cols: u16,
    pub flags: TermFlags,
}

impl Default for TermState {
    fn default() -> Self {
        Self { rows: DEFAULT_ROWS, cols: DEFAULT_COLS, flags: TermFlags::empty() }
    }
}

impl TermState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.flags.contains(TermFlags::SUPPORTED)
    }

    #[must_use]
    pub fn is_alt_active(&self) -> bool {
        self.flags.contains(TermFlags::ALT_ACTIVE)
    }

    /// Records a geometry reply: marks the terminal as supported and
    /// stores the reported size.
    pub fn apply_geometry(&mut self, rows: u16, cols: u16) {
        self.flags.insert(TermFlags::SUPPORTED);
        self.rows = rows;
        self.cols = cols;
    }

    pub fn enter_alt_screen(&mut self) {
        self.flags.insert(TermFlags::ALT_ACTIVE);
    }

    pub fn leave_alt_screen(&mut self) {
        self.flags.remove(TermFlags::ALT_ACTIVE);
    }
}

/// Scans `prompt` for its on-screen column width, skipping any `CSI …
/// m` (SGR) escape so colored prompts don't inflate the cursor-offset
/// math (spec.md §4.G, `vln_calculate_prompt`). Returns `(len,
/// visible_width)`: `len` is the byte count up to and including the
/// terminator, `visible_width` counts only the bytes that actually
/// occupy a column.
#[must_use]
pub fn prompt_width(prompt: &[u8]) -> (usize, u16) {
    let mut len = 0usize;
    let mut width = 0u16;
    let mut in_sgr = false;

    for &c in prompt {
        len += 1;
        if c == 0x1B {
            in_sgr = true;
        } else if in_sgr {
            if c == b'm' {
                in_sgr = false;
            }
        } else {
            width = width.saturating_add(1);
        }
    }

    (len, width)
}

/// Sends the `CSI 18 t` geometry probe and, if the transport accepted
/// the whole write, blocks for one reply byte and parses it if it
/// turns out to be the start of an escape sequence. Any other byte --
/// or a transport that didn't accept the probe -- leaves `state`
/// unchanged; the terminal is then treated as non-xterm and `state`
/// keeps its default geometry (spec.md §4.G, `vln_detect`).
pub fn detect<T: Transport>(transport: &mut T, state: &mut TermState) {
    let mut buf = [0u8; 8];
    let mut idx = 0;
    seq::report_screen_size(&mut buf, &mut idx);

    if transport.write(&buf[..idx]) != idx as u16 {
        return;
    }

    let mut byte = [0u8; 1];
    if transport.read(&mut byte) != 1 || byte[0] != 0x1B {
        return;
    }

    if let Ok(token) = parse(transport) {
        if let Action::GeometryReport { rows, cols } = dispatch(&token) {
            state.apply_geometry(rows, cols);
        }
    }
}

/// Runs the help excursion inside a temporary alternate screen:
/// switch in, clear, home the cursor, run `help`, switch back out
/// (spec.md §4.C).
pub fn with_alt_screen<T: Transport>(
    transport: &mut T,
    state: &mut TermState,
    mut help: impl FnMut(&mut T) -> Result<()>,
) -> Result<()> {
    let mut buf = [0u8; 16];

    let mut idx = 0;
    seq::alternate_screen_on(&mut buf, &mut idx);
    write_checked(transport, &buf[..idx])?;
    state.enter_alt_screen();

    idx = 0;
    seq::erase_display(&mut buf, &mut idx, 2);
    write_checked(transport, &buf[..idx])?;

    idx = 0;
    seq::cursor_position(&mut buf, &mut idx, 1, 1);
    write_checked(transport, &buf[..idx])?;

    let result = help(transport);

    idx = 0;
    seq::alternate_screen_off(&mut buf, &mut idx);
    write_checked(transport, &buf[..idx])?;
    state.leave_alt_screen();

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::ScriptedTransport;

    #[test]
    fn plain_prompt_width_counts_every_byte() {
        assert_eq!(prompt_width(b"$ "), (2, 2));
    }

    #[test]
    fn sgr_colored_prompt_excludes_escape_bytes_from_width() {
        let prompt = b"\x1b[31m$ \x1b[0m";
        let (len, width) = prompt_width(prompt);
        assert_eq!(len, prompt.len());
        assert_eq!(width, 2);
    }

    #[test]
    fn empty_prompt_has_zero_width() {
        assert_eq!(prompt_width(b""), (0, 0));
    }

    #[test]
    fn detect_applies_geometry_reply() {
        let mut t = ScriptedTransport::new(b"\x1b[8;24;80t");
        let mut state = TermState::new();
        detect(&mut t, &mut state);
        assert!(state.is_supported());
        assert_eq!(state.rows, 24);
        assert_eq!(state.cols, 80);
        assert_eq!(t.output, b"\x1b[18t");
    }

    #[test]
    fn detect_leaves_defaults_when_terminal_stays_silent() {
        let mut t = ScriptedTransport::new(b"");
        let mut state = TermState::new();
        detect(&mut t, &mut state);
        assert!(!state.is_supported());
        assert_eq!(state.rows, DEFAULT_ROWS);
        assert_eq!(state.cols, DEFAULT_COLS);
    }

    #[test]
    fn detect_ignores_unrelated_replies() {
        let mut t = ScriptedTransport::new(b"\x1b[D");
        let mut state = TermState::new();
        detect(&mut t, &mut state);
        assert!(!state.is_supported());
    }

    #[test]
    fn alt_screen_flag_tracks_enter_and_leave() {
        let mut state = TermState::new();
        assert!(!state.is_alt_active());
        state.enter_alt_screen();
        assert!(state.is_alt_active());
        state.leave_alt_screen();
        assert!(!state.is_alt_active());
    }

    #[test]
    fn with_alt_screen_wraps_help_in_enter_clear_home_leave() {
        let mut t = ScriptedTransport::new(b"");
        let mut state = TermState::new();
        let mut help_ran = false;
        with_alt_screen(&mut t, &mut state, |_| {
            help_ran = true;
            Ok(())
        })
        .unwrap();
        assert!(help_ran);
        assert!(!state.is_alt_active());
        assert_eq!(t.output, b"\x1b[?47h\x1b[2J\x1b[1;1H\x1b[?47l");
    }
}
