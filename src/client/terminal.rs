//! Raw-mode terminal input and prompt drawing.
//!
//! Raw mode is process-wide state, so it lives behind a scoped guard that is
//! restored on drop no matter how the session ends. The line editor itself is
//! pure state; everything that touches the screen goes through [`Prompt`].

use crossterm::{
    cursor::MoveToColumn,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use std::io::{self, Write};
use tracing::debug;

/// Scoped raw-mode handle.
///
/// Dropping the guard restores cooked mode, including on error paths.
pub struct RawModeGuard(());

impl RawModeGuard {
    /// Switch the terminal to raw mode for character-at-a-time input.
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(error) = disable_raw_mode() {
            debug!(?error, "failed to restore terminal mode");
        }
    }
}

/// Bounded accumulator for the line being typed.
///
/// Capacity matches the wire message limit, so a completed line always fits
/// in a single outbound message. Characters past capacity are dropped.
#[derive(Debug)]
pub struct LineEditor {
    buffer: String,
    capacity: usize,
}

impl LineEditor {
    /// Create an editor bounded to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: String::new(),
            capacity,
        }
    }

    /// Append a character. Returns false when the buffer is full and the
    /// character was dropped.
    pub fn push_char(&mut self, c: char) -> bool {
        if self.buffer.len() + c.len_utf8() > self.capacity {
            debug!(dropped = %c, "input line at capacity");
            return false;
        }
        self.buffer.push(c);
        true
    }

    /// Remove the last character. Returns false on an empty buffer.
    pub fn backspace(&mut self) -> bool {
        self.buffer.pop().is_some()
    }

    /// Return the accumulated line and reset the buffer.
    pub fn take_line(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// Current buffer contents.
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Whether nothing has been typed yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Current buffer length in bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }
}

/// Prompt rendering plus the "is a prompt on screen" flag.
///
/// The flag keeps server output from interleaving with a half-typed line:
/// it is cleared exactly once before unsolicited output and set again on
/// each redraw.
pub struct Prompt {
    text: String,
    on_screen: bool,
}

impl Prompt {
    /// Create a prompt with the given leader text (rendered as `"{text} "`).
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            on_screen: false,
        }
    }

    /// The prompt leader text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Redraw the prompt and the in-progress input on the current line.
    pub fn redraw(&mut self, input: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        write!(stdout, "{} {}", self.text, input)?;
        stdout.flush()?;
        self.on_screen = true;
        Ok(())
    }

    /// Wipe the prompt line so unsolicited output starts on a clean line.
    /// No-op when no prompt is showing.
    pub fn clear_for_output(&mut self) -> io::Result<()> {
        if !self.on_screen {
            return Ok(());
        }
        let mut stdout = io::stdout();
        execute!(stdout, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        stdout.flush()?;
        self.on_screen = false;
        Ok(())
    }

    /// Advance past a submitted line, leaving it visible in the scrollback.
    pub fn end_line(&mut self) -> io::Result<()> {
        let mut stdout = io::stdout();
        // Raw mode needs an explicit carriage return.
        write!(stdout, "\r\n")?;
        stdout.flush()?;
        self.on_screen = false;
        Ok(())
    }

    /// Print one full output line. Assumes the prompt has been cleared.
    pub fn print_line(&mut self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout();
        write!(stdout, "{}\r\n", text)?;
        stdout.flush()?;
        self.on_screen = false;
        Ok(())
    }
}
