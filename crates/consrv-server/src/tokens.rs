//! Tokenizer: splits a raw input line into argument tokens.
//!
//! The tokenizer keeps a duplicated copy of the line and a reusable span
//! list, cleared between commands; the returned tokens are slices into
//! that copy. Tokenizing outside the dispatch window is a programming
//! contract violation: it is logged and degrades to an empty result.

/// Reusable token storage for one server instance.
#[derive(Debug, Default)]
pub struct Tokenizer {
    /// Duplicated copy of the current line.
    line: String,
    /// Token spans into `line`, reused across calls.
    spans: Vec<(usize, usize)>,
    /// True while a dispatch is in progress.
    in_window: bool,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the dispatch window. Called by the dispatcher only.
    pub(crate) fn open_window(&mut self) {
        self.in_window = true;
    }

    /// Close the window and reclaim the token storage.
    pub(crate) fn close_window(&mut self) {
        self.in_window = false;
        self.line.clear();
        self.spans.clear();
    }

    /// Split `input` on `delimiter`, trimming whitespace around each
    /// token and dropping empty tokens.
    pub fn tokenize(&mut self, input: &str, delimiter: char) -> Vec<&str> {
        if !self.in_window {
            log::error!("tokenize called outside the dispatch window; returning no tokens");
            return Vec::new();
        }
        self.line.clear();
        self.line.push_str(input);
        self.spans.clear();

        let mut start = 0;
        for (i, ch) in self.line.char_indices() {
            if ch == delimiter {
                self.spans.push((start, i));
                start = i + ch.len_utf8();
            }
        }
        self.spans.push((start, self.line.len()));

        let line = self.line.as_str();
        self.spans
            .iter()
            .map(|&(s, e)| line[s..e].trim())
            .filter(|t| !t.is_empty())
            .collect()
    }
}
