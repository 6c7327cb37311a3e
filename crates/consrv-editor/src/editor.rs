//! The line editor: raw bytes in, completed input lines out.
//!
//! One instance per interactive session. Owns the input buffer, cursor,
//! history ring, and completion vocabulary; renders edits in place with
//! ANSI cursor movement. `history` and `!` recall lines are intercepted
//! here and never returned to the caller as commands.

use std::time::Duration;

use consrv_types::Result;

use crate::complete::{format_columns, Completer, TabOutcome, TabStyle};
use crate::console::{Console, Read};
use crate::decoder::{InputDecoder, InputEvent, Personality};
use crate::history::History;

/// Default per-character read timeout (idle-session bound).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

const BELL: &[u8] = b"\x07";

/// Result of one `read_line` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// A completed, trimmed input line.
    Line(String),
    /// No input arrived within the idle timeout.
    Idle,
    /// The peer disconnected.
    Eof,
}

/// History navigation state while arrowing through prior entries.
#[derive(Debug)]
struct NavState {
    /// Position in the ring currently displayed.
    pos: usize,
    /// The in-progress line saved when navigation began.
    saved: String,
}

/// Character-at-a-time line editor.
pub struct LineEditor {
    buffer: String,
    cursor: usize,
    history: History,
    completer: Completer,
    tab_style: TabStyle,
    personality: Personality,
    idle_timeout: Duration,
    last_was_tab: bool,
    nav: Option<NavState>,
}

impl LineEditor {
    pub fn new(personality: Personality) -> Self {
        Self {
            buffer: String::new(),
            cursor: 0,
            history: History::default(),
            completer: Completer::new(),
            tab_style: TabStyle::Fast,
            personality,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            last_was_tab: false,
            nav: None,
        }
    }

    pub fn with_tab_style(mut self, style: TabStyle) -> Self {
        self.tab_style = style;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Replace the completion vocabulary (registered command names).
    pub fn set_completions(&mut self, words: Vec<String>) {
        self.completer.set_vocabulary(words);
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Read one line from the console.
    ///
    /// Blocks (in bounded steps) until the peer completes a line, goes
    /// idle past the timeout, or disconnects.
    pub fn read_line(&mut self, console: &mut dyn Console, prompt: &str) -> Result<LineOutcome> {
        self.buffer.clear();
        self.cursor = 0;
        self.nav = None;
        self.last_was_tab = false;
        let mut decoder = InputDecoder::new(self.personality);

        console.write_bytes(prompt.as_bytes())?;
        console.flush()?;

        loop {
            let byte = match console.read_byte(self.idle_timeout)? {
                Read::Byte(b) => b,
                Read::Idle => {
                    log::debug!("no input for {:?}, session is idle", self.idle_timeout);
                    return Ok(LineOutcome::Idle);
                },
                Read::Eof => {
                    log::debug!("peer closed the connection");
                    return Ok(LineOutcome::Eof);
                },
            };
            let Some(event) = decoder.feed(byte) else {
                continue;
            };

            let repeated_tab = self.last_was_tab;
            self.last_was_tab = event == InputEvent::Tab;

            match event {
                InputEvent::Insert(ch) => self.insert(console, ch)?,
                InputEvent::Backspace => self.backspace(console)?,
                InputEvent::DeleteForward => self.delete_forward(console)?,
                InputEvent::Left => {
                    if self.cursor > 0 {
                        self.cursor -= 1;
                        console.write_bytes(b"\x1b[D")?;
                    }
                },
                InputEvent::Right => {
                    if self.cursor < self.buffer.chars().count() {
                        self.cursor += 1;
                        console.write_bytes(b"\x1b[C")?;
                    }
                },
                InputEvent::Home => {
                    move_left(console, self.cursor)?;
                    self.cursor = 0;
                },
                InputEvent::End => {
                    let len = self.buffer.chars().count();
                    move_right(console, len - self.cursor)?;
                    self.cursor = len;
                },
                InputEvent::KillToEnd => {
                    self.buffer.truncate(self.byte_pos(self.cursor));
                    console.write_bytes(b"\x1b[K")?;
                },
                InputEvent::KillLine => {
                    move_left(console, self.cursor)?;
                    console.write_bytes(b"\x1b[K")?;
                    self.buffer.clear();
                    self.cursor = 0;
                },
                InputEvent::Up => self.history_up(console, prompt)?,
                InputEvent::Down => self.history_down(console, prompt)?,
                InputEvent::Tab => self.tab(console, prompt, repeated_tab)?,
                InputEvent::Enter => {
                    console.write_bytes(b"\r\n")?;
                    let line = self.buffer.trim().to_string();
                    self.buffer.clear();
                    self.cursor = 0;
                    self.nav = None;

                    if line == "history" {
                        console.write_bytes(self.history.listing().as_bytes())?;
                        console.write_bytes(prompt.as_bytes())?;
                        console.flush()?;
                        continue;
                    }
                    if let Some(rest) = line.strip_prefix('!')
                        && !rest.is_empty()
                    {
                        match self.recall(rest) {
                            Some(entry) => {
                                console.write_bytes(entry.as_bytes())?;
                                console.write_bytes(b"\r\n")?;
                                console.flush()?;
                                self.history.push(&entry);
                                return Ok(LineOutcome::Line(entry));
                            },
                            None => {
                                console
                                    .write_bytes(format!("!{rest}: event not found\r\n").as_bytes())?;
                                console.write_bytes(prompt.as_bytes())?;
                                console.flush()?;
                                continue;
                            },
                        }
                    }

                    if !line.is_empty() {
                        self.history.push(&line);
                    }
                    console.flush()?;
                    return Ok(LineOutcome::Line(line));
                },
            }
            console.flush()?;
        }
    }

    /// Recall a history entry by index (`!3`) or substring (`!sta`).
    fn recall(&self, spec: &str) -> Option<String> {
        match spec.parse::<usize>() {
            Ok(index) => self.history.recall_index(index).map(str::to_string),
            Err(_) => self.history.recall_substring(spec).map(str::to_string),
        }
    }

    fn byte_pos(&self, char_pos: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(char_pos)
            .map_or(self.buffer.len(), |(i, _)| i)
    }

    fn insert(&mut self, console: &mut dyn Console, ch: char) -> Result<()> {
        let byte_pos = self.byte_pos(self.cursor);
        self.buffer.insert(byte_pos, ch);
        self.cursor += 1;
        // Repaint from the inserted character, then park the cursor back.
        let tail = &self.buffer[byte_pos..];
        console.write_bytes(tail.as_bytes())?;
        move_left(console, tail.chars().count() - 1)?;
        Ok(())
    }

    fn backspace(&mut self, console: &mut dyn Console) -> Result<()> {
        if self.cursor == 0 {
            return Ok(());
        }
        self.cursor -= 1;
        let byte_pos = self.byte_pos(self.cursor);
        self.buffer.remove(byte_pos);
        console.write_bytes(b"\x08")?;
        let tail = self.buffer[byte_pos..].to_string();
        console.write_bytes(tail.as_bytes())?;
        console.write_bytes(b" ")?;
        move_left(console, tail.chars().count() + 1)?;
        Ok(())
    }

    fn delete_forward(&mut self, console: &mut dyn Console) -> Result<()> {
        if self.cursor >= self.buffer.chars().count() {
            return Ok(());
        }
        let byte_pos = self.byte_pos(self.cursor);
        self.buffer.remove(byte_pos);
        let tail = self.buffer[byte_pos..].to_string();
        console.write_bytes(tail.as_bytes())?;
        console.write_bytes(b" ")?;
        move_left(console, tail.chars().count() + 1)?;
        Ok(())
    }

    /// Replace the whole displayed line with `text`.
    fn replace_line(
        &mut self,
        console: &mut dyn Console,
        prompt: &str,
        text: &str,
    ) -> Result<()> {
        console.write_bytes(b"\r")?;
        console.write_bytes(prompt.as_bytes())?;
        console.write_bytes(b"\x1b[K")?;
        console.write_bytes(text.as_bytes())?;
        self.buffer = text.to_string();
        self.cursor = text.chars().count();
        Ok(())
    }

    fn history_up(&mut self, console: &mut dyn Console, prompt: &str) -> Result<()> {
        if self.history.is_empty() {
            console.write_bytes(BELL)?;
            return Ok(());
        }
        let pos = match &self.nav {
            Some(nav) if nav.pos > 0 => nav.pos - 1,
            Some(nav) => nav.pos,
            None => {
                self.nav = Some(NavState {
                    pos: self.history.len(),
                    saved: self.buffer.clone(),
                });
                self.history.len() - 1
            },
        };
        if let Some(nav) = &mut self.nav {
            nav.pos = pos;
        }
        let entry = self.history.get(pos).unwrap_or_default().to_string();
        self.replace_line(console, prompt, &entry)
    }

    fn history_down(&mut self, console: &mut dyn Console, prompt: &str) -> Result<()> {
        let Some(nav) = &mut self.nav else {
            console.write_bytes(BELL)?;
            return Ok(());
        };
        nav.pos += 1;
        if nav.pos >= self.history.len() {
            let saved = self.nav.take().map(|n| n.saved).unwrap_or_default();
            return self.replace_line(console, prompt, &saved);
        }
        let entry = self.history.get(nav.pos).unwrap_or_default().to_string();
        self.replace_line(console, prompt, &entry)
    }

    fn tab(&mut self, console: &mut dyn Console, prompt: &str, repeated: bool) -> Result<()> {
        // Completion applies to the first word only.
        let head = &self.buffer[..self.byte_pos(self.cursor)];
        if head.contains(char::is_whitespace) {
            console.write_bytes(BELL)?;
            return Ok(());
        }
        let word = head.to_string();
        let rest = self.buffer[self.byte_pos(self.cursor)..].to_string();
        match self.completer.complete(&word, self.tab_style, repeated) {
            TabOutcome::Nothing => {
                console.write_bytes(BELL)?;
                Ok(())
            },
            TabOutcome::Fill(fill) => {
                let line = format!("{fill}{rest}");
                let cursor_at = fill.chars().count();
                self.replace_line(console, prompt, &line)?;
                let back = self.cursor - cursor_at;
                move_left(console, back)?;
                self.cursor = cursor_at;
                Ok(())
            },
            TabOutcome::List { matches, fill } => {
                console.write_bytes(b"\r\n")?;
                console.write_bytes(format_columns(&matches).as_bytes())?;
                let line = format!("{fill}{rest}");
                let cursor_at = fill.chars().count();
                self.replace_line(console, prompt, &line)?;
                let back = self.cursor - cursor_at;
                move_left(console, back)?;
                self.cursor = cursor_at;
                Ok(())
            },
        }
    }
}

fn move_left(console: &mut dyn Console, n: usize) -> Result<()> {
    if n > 0 {
        console.write_bytes(format!("\x1b[{n}D").as_bytes())?;
    }
    Ok(())
}

fn move_right(console: &mut dyn Console, n: usize) -> Result<()> {
    if n > 0 {
        console.write_bytes(format!("\x1b[{n}C").as_bytes())?;
    }
    Ok(())
}
