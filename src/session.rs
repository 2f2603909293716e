//! Component F: the session driver.
//!
//! [`Session`] is the root aggregate spec.md §3 describes: a prompt, a
//! transport, cached terminal state, and an optional history ring.
//! [`Session::read_line`] is the per-call outer loop that ties every
//! other component together (`original_source/vln.c`'s `vln_inernal`).

use crate::action::{dispatch, dispatch_c0, Action};
use crate::error::{Error, Result};
use crate::history::HistoryRing;
use crate::line::{Editor, LineBuffer};
use crate::parse::parse;
use crate::seq;
use crate::term::{self, TermState};
use crate::transport::{read_one_byte, write_checked, Transport};

const DEL: u8 = 0x7F;
const ESC: u8 = 0x1B;

/// Builder for [`Session`], in the style of a `with_*`-method config
/// object: construct with [`SessionConfig::new`], chain setters, then
/// call [`SessionConfig::build`].
#[derive(Debug)]
pub struct SessionConfig<'a> {
    prompt: &'a [u8],
    newline: &'a [u8],
    help: &'a [u8],
    mask: bool,
    xterm: bool,
    history: Option<&'a mut [u8]>,
}

impl<'a> SessionConfig<'a> {
    /// A config with the given prompt, CRLF newline, no help text,
    /// mask off, xterm gating off, and no history ring.
    #[must_use]
    pub fn new(prompt: &'a [u8]) -> Self {
        Self { prompt, newline: b"\r\n", help: b"", mask: false, xterm: false, history: None }
    }

    /// Overrides the newline string emitted after a committed line
    /// (default `"\r\n"`).
    pub fn newline(&mut self, newline: &'a [u8]) -> &mut Self {
        self.newline = newline;
        self
    }

    /// The text written inside the alternate-screen excursion `Ctrl-_`
    /// (or the geometry-probe reply) triggers. The content itself is
    /// a caller concern (spec.md §1); an empty slice writes nothing.
    pub fn help(&mut self, help: &'a [u8]) -> &mut Self {
        self.help = help;
        self
    }

    /// Starts every new line in mask mode (spaces echoed instead of
    /// the payload, for password-style entry).
    pub fn mask(&mut self, on: bool) -> &mut Self {
        self.mask = on;
        self
    }

    /// Gates the start of every `read_line` on an xterm-capability
    /// handshake (spec.md §4.F step 3, §9's design note).
    pub fn xterm(&mut self, on: bool) -> &mut Self {
        self.xterm = on;
        self
    }

    /// Supplies the caller-owned history arena. Must be a power-of-two
    /// length of at least 2.
    pub fn history(&mut self, buf: &'a mut [u8]) -> &mut Self {
        self.history = Some(buf);
        self
    }

    /// Validates the configuration and builds a [`Session`].
    ///
    /// # Errors
    /// [`Error::NullConfig`] if the prompt is empty; propagates
    /// [`Error::HistoryNotPowerOfTwo`] from [`HistoryRing::new`] if a
    /// history buffer was supplied but is malformed.
    pub fn build<T: Transport>(self, transport: T) -> Result<Session<'a, T>> {
        if self.prompt.is_empty() {
            return Err(Error::NullConfig);
        }
        let history = match self.history {
            Some(buf) => Some(HistoryRing::new(buf)?),
            None => None,
        };
        Ok(Session {
            transport,
            prompt: self.prompt,
            newline: self.newline,
            help: self.help,
            mask: self.mask,
            xterm: self.xterm,
            term: TermState::new(),
            history,
        })
    }
}

/// The root session aggregate (spec.md §3). Owns the transport, the
/// prompt, cached terminal geometry, and the optional history ring
/// across the lifetime of however many [`Session::read_line`] calls
/// the caller makes.
pub struct Session<'a, T: Transport> {
    transport: T,
    prompt: &'a [u8],
    newline: &'a [u8],
    help: &'a [u8],
    mask: bool,
    xterm: bool,
    term: TermState,
    history: Option<HistoryRing<'a>>,
}

// Manual impl: deriving would add a `T: Debug` bound onto every
// `Transport` impl, which is more than a byte-I/O trait should demand.
impl<'a, T: Transport> core::fmt::Debug for Session<'a, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("transport", &"<dyn Transport>")
            .field("prompt", &self.prompt)
            .field("newline", &self.newline)
            .field("help", &self.help)
            .field("mask", &self.mask)
            .field("xterm", &self.xterm)
            .field("term", &self.term)
            .field("history", &self.history)
            .finish()
    }
}

impl<'a, T: Transport> Session<'a, T> {
    /// Runs the `CSI 18 t` geometry probe (spec.md §4.G). Safe to call
    /// at any time; a non-responding terminal leaves [`TermState`] at
    /// its defaults.
    pub fn detect(&mut self) {
        term::detect(&mut self.transport, &mut self.term);
    }

    /// Toggles the session-level mask default applied to new lines.
    pub fn set_mask(&mut self, on: bool) {
        self.mask = on;
    }

    #[must_use]
    pub fn term(&self) -> &TermState {
        &self.term
    }

    /// Clears the screen and re-emits the prompt. Only meaningful
    /// outside an active `read_line` call (there is no live line to
    /// redraw); callers editing mid-line get redraws via `ClearScreen`
    /// inside the loop instead.
    pub fn clear(&mut self) -> Result<()> {
        let mut buf = [0u8; 16];
        let mut idx = 0;
        seq::erase_display(&mut buf, &mut idx, 2);
        seq::cursor_position(&mut buf, &mut idx, 1, 1);
        write_checked(&mut self.transport, &buf[..idx])?;
        write_checked(&mut self.transport, self.prompt)
    }

    fn run_help(&mut self) -> Result<()> {
        let (transport, term, help) = (&mut self.transport, &mut self.term, self.help);
        term::with_alt_screen(transport, term, |t| {
            if help.is_empty() {
                Ok(())
            } else {
                write_checked(t, help)
            }
        })
    }

    /// Blocks until the user presses Enter, then switches to the
    /// alternate screen (spec.md §4.F step 3, §9's xterm-gating note).
    fn await_altscreen_entry(&mut self) -> Result<()> {
        loop {
            let c = read_one_byte(&mut self.transport);
            if c == 0x0D || c == 0x0A {
                let mut buf = [0u8; 8];
                let mut idx = 0;
                seq::alternate_screen_on(&mut buf, &mut idx);
                write_checked(&mut self.transport, &buf[..idx])?;
                self.term.enter_alt_screen();
                return Ok(());
            }
        }
    }

    /// Reads one logical line, in place, per spec.md §4.F.
    ///
    /// `buf` must be larger than 5 bytes (2-byte `size` header, 2-byte
    /// `mask` header, payload, and 1 reserved terminator byte).
    /// Returns the committed payload and its length, or propagates a
    /// parse error / buffer-size error.
    pub fn read_line<'b>(&mut self, buf: &'b mut [u8]) -> Result<(&'b [u8], usize)> {
        let mut line = LineBuffer::new(buf)?;
        line.set_size(0);
        line.set_mask_flag(u16::from(self.mask));
        if let Some(h) = &mut self.history {
            h.reset_index();
        }

        let (prompt_len, prompt_width) = term::prompt_width(self.prompt);
        let mut editor = Editor::new(line, prompt_width);

        if self.xterm && !self.term.is_supported() {
            self.await_altscreen_entry()?;
        }

        write_checked(&mut self.transport, &self.prompt[..prompt_len])?;

        loop {
            let c = read_one_byte(&mut self.transport);
            if c & 0x80 != 0 {
                continue;
            }

            let action = if (0x20..=0x7E).contains(&c) {
                editor.insert(&mut self.transport, self.term.cols, c)?;
                continue;
            } else if c == DEL {
                Action::Backspace
            } else if c == ESC {
                let token = parse(&mut self.transport)?;
                dispatch(&token)
            } else {
                dispatch_c0(c)
            };

            if self.dispatch_action(&mut editor, action)?.is_some() {
                let size = editor.buffer.size() as usize;
                write_checked(&mut self.transport, self.newline)?;
                editor.buffer.terminate();
                return Ok((&editor.buffer.raw()[4..], size));
            }
        }
    }

    /// Executes one dispatched [`Action`]. Returns `Ok(Some(()))` when
    /// the line is finished (the caller should stop looping and
    /// commit), `Ok(None)` to keep reading.
    fn dispatch_action(&mut self, editor: &mut Editor<'_>, action: Action) -> Result<Option<()>> {
        let cols = self.term.cols;
        match action {
            Action::None => {}
            Action::ClearScreen => editor.clear(&mut self.transport, cols, self.prompt)?,
            Action::Newline => {
                if let Some(h) = &mut self.history {
                    h.commit_line(&editor.buffer);
                }
                return Ok(Some(()));
            }
            Action::AbortLine => {
                editor.buffer.set_size(0);
                return Ok(Some(()));
            }
            Action::Delete => editor.delete(&mut self.transport, cols)?,
            Action::Backspace => editor.backspace(&mut self.transport, cols)?,
            Action::MoveRight => editor.move_right(&mut self.transport, cols)?,
            Action::MoveLeft => editor.move_left(&mut self.transport, cols)?,
            Action::MoveEnd => editor.move_end(&mut self.transport, cols)?,
            Action::MoveHome => editor.move_home(&mut self.transport, cols)?,
            Action::HistoryPrev => {
                if let Some(h) = &mut self.history {
                    if h.prev(&mut editor.buffer) {
                        editor.cursor = editor.buffer.size();
                        editor.refresh(&mut self.transport, cols)?;
                    }
                }
            }
            Action::HistoryNext => {
                if let Some(h) = &mut self.history {
                    if h.next(&mut editor.buffer) {
                        editor.cursor = editor.buffer.size();
                        editor.refresh(&mut self.transport, cols)?;
                    }
                }
            }
            Action::DeleteWord => editor.delete_word(&mut self.transport, cols)?,
            Action::DeleteWholeLine => editor.delete_whole_line(&mut self.transport, cols)?,
            Action::DeleteToEnd => editor.delete_to_end(&mut self.transport, cols)?,
            Action::ListCompletions | Action::AutoComplete => {}
            Action::SwitchNormalScreen => {
                if self.term.is_supported() && self.term.is_alt_active() {
                    let mut buf = [0u8; 8];
                    let mut idx = 0;
                    seq::alternate_screen_off(&mut buf, &mut idx);
                    write_checked(&mut self.transport, &buf[..idx])?;
                    self.term.leave_alt_screen();
                }
            }
            Action::ShowHelp => {
                self.run_help()?;
                editor.buffer.set_size(0);
                return Ok(Some(()));
            }
            Action::Function(_) => {}
            Action::GeometryReport { rows, cols } => {
                self.term.apply_geometry(rows, cols);
                self.run_help()?;
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::ScriptedTransport;

    fn session<'a>(
        prompt: &'a [u8],
        history: Option<&'a mut [u8]>,
        script: &[u8],
    ) -> Session<'a, ScriptedTransport> {
        let mut cfg = SessionConfig::new(prompt);
        if let Some(h) = history {
            cfg.history(h);
        }
        cfg.build(ScriptedTransport::new(script)).unwrap()
    }

    // S1: `h e l l o CR` -> "hello", len 5, one history record.
    #[test]
    fn s1_simple_commit_and_history() {
        let mut hist = [0u8; 64];
        let mut s = session(b"> ", Some(&mut hist), b"hello\r");
        let mut buf = [0u8; 32];
        let (payload, len) = s.read_line(&mut buf).unwrap();
        assert_eq!(&payload[..len], b"hello");
    }

    // S2: `a b c <Left> <Left> X CR` -> "aXbc", cursor 2 on commit.
    #[test]
    fn s2_insert_with_cursor_movement() {
        let mut s = session(b"> ", None, b"abc\x1b[D\x1b[DX\r");
        let mut buf = [0u8; 32];
        let (payload, len) = s.read_line(&mut buf).unwrap();
        assert_eq!(&payload[..len], b"aXbc");
    }

    // S3: `one CR two CR <Up> CR` then `<Up><Up>` then `<Down>`.
    #[test]
    fn s3_history_navigation_lifo() {
        let mut hist = [0u8; 64];
        let script = b"one\rtwo\r\x1b[A\r";
        let mut s = session(b"> ", Some(&mut hist), script);

        let mut buf = [0u8; 32];
        let (p1, l1) = s.read_line(&mut buf).unwrap();
        assert_eq!(&p1[..l1], b"one");
        let (p2, l2) = s.read_line(&mut buf).unwrap();
        assert_eq!(&p2[..l2], b"two");
        let (p3, l3) = s.read_line(&mut buf).unwrap();
        assert_eq!(&p3[..l3], b"two");
    }

    // S4: `foo bar <Ctrl-W> CR` -> "foo " (trailing space retained).
    #[test]
    fn s4_delete_word_keeps_trailing_space() {
        let mut s = session(b"> ", None, b"foo bar\x17\r");
        let mut buf = [0u8; 32];
        let (payload, len) = s.read_line(&mut buf).unwrap();
        assert_eq!(&payload[..len], b"foo ");
    }

    // S5: `abc <Ctrl-U> xyz CR` -> "xyz".
    #[test]
    fn s5_kill_whole_line_then_retype() {
        let mut s = session(b"> ", None, b"abc\x15xyz\r");
        let mut buf = [0u8; 32];
        let (payload, len) = s.read_line(&mut buf).unwrap();
        assert_eq!(&payload[..len], b"xyz");
    }

    // S6: `<Ctrl-C>` mid-line after "hello" -> payload length 0, no
    // history record.
    #[test]
    fn s6_abort_line_discards_input_and_history() {
        let mut hist = [0u8; 64];
        let mut s = session(b"> ", Some(&mut hist), b"hello\x03");
        let mut buf = [0u8; 32];
        let (_payload, len) = s.read_line(&mut buf).unwrap();
        assert_eq!(len, 0);

        // Nothing was committed, so a later read_line can't recall it.
        let mut buf2 = [0u8; 32];
        let script2 = b"\x1b[A\r";
        let mut s2 = session(b"> ", Some(&mut hist), script2);
        let (_p, l) = s2.read_line(&mut buf2).unwrap();
        assert_eq!(l, 0);
    }

    #[test]
    fn rejects_empty_prompt() {
        let cfg = SessionConfig::new(b"");
        assert_eq!(cfg.build(ScriptedTransport::new(b"")).unwrap_err(), Error::NullConfig);
    }

    #[test]
    fn mask_mode_never_echoes_payload_bytes() {
        let mut cfg = SessionConfig::new(b"> ");
        cfg.mask(true);
        let mut s = cfg.build(ScriptedTransport::new(b"secret\r")).unwrap();
        let mut buf = [0u8; 32];
        let (payload, len) = s.read_line(&mut buf).unwrap();
        assert_eq!(&payload[..len], b"secret");
    }
}
