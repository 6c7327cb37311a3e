//! Input decoder: bytes in, edit events out.
//!
//! An explicit three-state machine (`Normal`, `Escape`, `Csi`) replaces
//! nested conditionals on raw byte values. Feed it one byte at a time;
//! most bytes produce an event immediately, escape sequences produce one
//! event when the final byte arrives.

/// Which kind of input source the decoder reads.
///
/// A raw character device treats bare LF as a line terminator; a socket
/// (telnet-style) peer terminates lines with CR and any following LF is
/// the tail of the CRLF pair and must be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Personality {
    CharDevice,
    Socket,
}

/// Editing events produced by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Printable character to insert at the cursor.
    Insert(char),
    /// Line terminator.
    Enter,
    /// Delete the character before the cursor.
    Backspace,
    /// Delete the character under the cursor.
    DeleteForward,
    /// Completion request.
    Tab,
    Left,
    Right,
    /// Older history entry.
    Up,
    /// Newer history entry.
    Down,
    Home,
    End,
    /// Kill from the cursor to the end of the line.
    KillToEnd,
    /// Kill the whole line.
    KillLine,
}

/// Decoder states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Plain input.
    Normal,
    /// Saw ESC (0x1B), waiting for `[`.
    Escape,
    /// Inside a CSI sequence; holds a pending parameter digit.
    Csi(Option<u8>),
}

const ESC: u8 = 0x1b;

/// Escape-sequence state machine.
#[derive(Debug)]
pub struct InputDecoder {
    state: DecodeState,
    personality: Personality,
}

impl InputDecoder {
    pub fn new(personality: Personality) -> Self {
        Self {
            state: DecodeState::Normal,
            personality,
        }
    }

    /// Current state, exposed for tests.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Advance the machine by one byte.
    pub fn feed(&mut self, byte: u8) -> Option<InputEvent> {
        match self.state {
            DecodeState::Normal => self.feed_normal(byte),
            DecodeState::Escape => {
                if byte == b'[' {
                    self.state = DecodeState::Csi(None);
                } else {
                    // Not a CSI introducer: drop the sequence.
                    self.state = DecodeState::Normal;
                }
                None
            },
            DecodeState::Csi(pending) => self.feed_csi(pending, byte),
        }
    }

    fn feed_normal(&mut self, byte: u8) -> Option<InputEvent> {
        match byte {
            ESC => {
                self.state = DecodeState::Escape;
                None
            },
            0x0d => Some(InputEvent::Enter),
            0x0a => match self.personality {
                Personality::CharDevice => Some(InputEvent::Enter),
                Personality::Socket => None,
            },
            0x08 | 0x7f => Some(InputEvent::Backspace),
            0x01 => Some(InputEvent::Home),
            0x05 => Some(InputEvent::End),
            0x0b => Some(InputEvent::KillToEnd),
            0x15 => Some(InputEvent::KillLine),
            0x04 => Some(InputEvent::DeleteForward),
            0x09 => Some(InputEvent::Tab),
            0x20..=0x7e => Some(InputEvent::Insert(byte as char)),
            // Other control bytes (telnet negotiation leftovers, NUL) are
            // ignored.
            _ => None,
        }
    }

    fn feed_csi(&mut self, pending: Option<u8>, byte: u8) -> Option<InputEvent> {
        if let Some(digit) = pending {
            self.state = DecodeState::Normal;
            if byte == b'~' {
                return match digit {
                    b'1' | b'7' => Some(InputEvent::Home),
                    b'4' | b'8' => Some(InputEvent::End),
                    b'3' => Some(InputEvent::DeleteForward),
                    _ => None,
                };
            }
            return None;
        }
        match byte {
            b'A' => {
                self.state = DecodeState::Normal;
                Some(InputEvent::Up)
            },
            b'B' => {
                self.state = DecodeState::Normal;
                Some(InputEvent::Down)
            },
            b'C' => {
                self.state = DecodeState::Normal;
                Some(InputEvent::Right)
            },
            b'D' => {
                self.state = DecodeState::Normal;
                Some(InputEvent::Left)
            },
            b'H' => {
                self.state = DecodeState::Normal;
                Some(InputEvent::Home)
            },
            b'F' => {
                self.state = DecodeState::Normal;
                Some(InputEvent::End)
            },
            b'0'..=b'9' => {
                self.state = DecodeState::Csi(Some(byte));
                None
            },
            _ => {
                self.state = DecodeState::Normal;
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(dec: &mut InputDecoder, bytes: &[u8]) -> Vec<InputEvent> {
        bytes.iter().filter_map(|&b| dec.feed(b)).collect()
    }

    #[test]
    fn printable_chars_insert() {
        let mut dec = InputDecoder::new(Personality::Socket);
        assert_eq!(dec.feed(b'a'), Some(InputEvent::Insert('a')));
        assert_eq!(dec.feed(b' '), Some(InputEvent::Insert(' ')));
        assert_eq!(dec.feed(b'~'), Some(InputEvent::Insert('~')));
    }

    #[test]
    fn control_byte_edits() {
        let mut dec = InputDecoder::new(Personality::Socket);
        assert_eq!(dec.feed(0x01), Some(InputEvent::Home));
        assert_eq!(dec.feed(0x05), Some(InputEvent::End));
        assert_eq!(dec.feed(0x0b), Some(InputEvent::KillToEnd));
        assert_eq!(dec.feed(0x15), Some(InputEvent::KillLine));
        assert_eq!(dec.feed(0x08), Some(InputEvent::Backspace));
        assert_eq!(dec.feed(0x7f), Some(InputEvent::Backspace));
        assert_eq!(dec.feed(0x04), Some(InputEvent::DeleteForward));
        assert_eq!(dec.feed(0x09), Some(InputEvent::Tab));
    }

    #[test]
    fn cr_terminates_both_personalities() {
        for p in [Personality::CharDevice, Personality::Socket] {
            let mut dec = InputDecoder::new(p);
            assert_eq!(dec.feed(0x0d), Some(InputEvent::Enter));
        }
    }

    #[test]
    fn bare_lf_policy_differs() {
        let mut dev = InputDecoder::new(Personality::CharDevice);
        assert_eq!(dev.feed(0x0a), Some(InputEvent::Enter));

        let mut sock = InputDecoder::new(Personality::Socket);
        assert_eq!(sock.feed(0x0a), None);
    }

    #[test]
    fn arrow_keys() {
        let mut dec = InputDecoder::new(Personality::Socket);
        assert_eq!(feed_all(&mut dec, b"\x1b[A"), vec![InputEvent::Up]);
        assert_eq!(feed_all(&mut dec, b"\x1b[B"), vec![InputEvent::Down]);
        assert_eq!(feed_all(&mut dec, b"\x1b[C"), vec![InputEvent::Right]);
        assert_eq!(feed_all(&mut dec, b"\x1b[D"), vec![InputEvent::Left]);
    }

    #[test]
    fn home_end_finals() {
        let mut dec = InputDecoder::new(Personality::Socket);
        assert_eq!(feed_all(&mut dec, b"\x1b[H"), vec![InputEvent::Home]);
        assert_eq!(feed_all(&mut dec, b"\x1b[F"), vec![InputEvent::End]);
        assert_eq!(feed_all(&mut dec, b"\x1b[1~"), vec![InputEvent::Home]);
        assert_eq!(feed_all(&mut dec, b"\x1b[4~"), vec![InputEvent::End]);
    }

    #[test]
    fn delete_sequence_holds_pending_digit() {
        let mut dec = InputDecoder::new(Personality::Socket);
        assert_eq!(dec.feed(ESC), None);
        assert_eq!(dec.feed(b'['), None);
        assert_eq!(dec.state(), DecodeState::Csi(None));
        assert_eq!(dec.feed(b'3'), None);
        assert_eq!(dec.state(), DecodeState::Csi(Some(b'3')));
        assert_eq!(dec.feed(b'~'), Some(InputEvent::DeleteForward));
        assert_eq!(dec.state(), DecodeState::Normal);
    }

    #[test]
    fn unknown_escape_drops_sequence() {
        let mut dec = InputDecoder::new(Personality::Socket);
        // ESC followed by something other than '[' is dropped entirely.
        assert_eq!(feed_all(&mut dec, b"\x1bOa"), vec![InputEvent::Insert('a')]);
        assert_eq!(dec.state(), DecodeState::Normal);
    }

    #[test]
    fn unknown_csi_final_drops_sequence() {
        let mut dec = InputDecoder::new(Personality::Socket);
        assert_eq!(feed_all(&mut dec, b"\x1b[Zx"), vec![InputEvent::Insert('x')]);
    }

    #[test]
    fn pending_digit_without_tilde_drops() {
        let mut dec = InputDecoder::new(Personality::Socket);
        assert_eq!(feed_all(&mut dec, b"\x1b[3x"), vec![]);
        assert_eq!(dec.state(), DecodeState::Normal);
    }

    #[test]
    fn control_returns_to_normal_after_sequence() {
        let mut dec = InputDecoder::new(Personality::Socket);
        assert_eq!(
            feed_all(&mut dec, b"\x1b[Cq"),
            vec![InputEvent::Right, InputEvent::Insert('q')]
        );
    }

    #[test]
    fn other_control_bytes_ignored() {
        let mut dec = InputDecoder::new(Personality::Socket);
        assert_eq!(dec.feed(0x00), None);
        assert_eq!(dec.feed(0x03), None);
        assert_eq!(dec.feed(0xff), None);
    }
}
