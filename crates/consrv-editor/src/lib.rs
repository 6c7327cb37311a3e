//! Terminal line-editing engine for consrv.
//!
//! Turns a stream of raw bytes from an interactive peer into completed,
//! history-recorded input lines. Owns the escape-sequence decoder, the
//! history ring, tab completion, and the character-at-a-time editor loop.

pub mod complete;
pub mod console;
pub mod decoder;
pub mod editor;
pub mod history;

pub use complete::{Completer, TabStyle};
pub use console::{Console, Read, ScriptedConsole, SocketConsole};
pub use decoder::{DecodeState, InputDecoder, InputEvent, Personality};
pub use editor::{LineEditor, LineOutcome};
pub use history::History;
