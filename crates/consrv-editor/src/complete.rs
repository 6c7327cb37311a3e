//! Tab completion over a registered vocabulary.
//!
//! Matching is a whole-prefix test, case-sensitive, applied to the first
//! word of the input line only. Two selectable styles control when
//! multiple candidates are listed.

/// Candidates per display row.
const LIST_COLUMNS: usize = 4;

/// When multiple candidates are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabStyle {
    /// A single TAB lists all matches immediately and fills the input to
    /// the longest common prefix of the candidates.
    Fast,
    /// The first TAB fills only when it can extend the input; listing
    /// requires a second consecutive TAB.
    Classic,
}

/// What the editor should do after a TAB press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabOutcome {
    /// No candidates (or nothing to change yet).
    Nothing,
    /// Replace the current word with this text.
    Fill(String),
    /// Display the candidates and replace the current word with `fill`.
    List { matches: Vec<String>, fill: String },
}

/// Completion vocabulary and matching.
#[derive(Debug, Default)]
pub struct Completer {
    vocabulary: Vec<String>,
}

impl Completer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole vocabulary.
    pub fn set_vocabulary(&mut self, words: Vec<String>) {
        self.vocabulary = words;
        self.vocabulary.sort();
    }

    /// Add one word, keeping the vocabulary sorted.
    pub fn add(&mut self, word: impl Into<String>) {
        let word = word.into();
        if let Err(pos) = self.vocabulary.binary_search(&word) {
            self.vocabulary.insert(pos, word);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    /// All vocabulary words having `prefix` as a whole prefix.
    pub fn matches(&self, prefix: &str) -> Vec<&str> {
        self.vocabulary
            .iter()
            .filter(|w| w.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }

    /// Resolve a TAB press on `word`.
    ///
    /// `repeated` is true when this TAB immediately follows another with
    /// no intervening edit (the classic double-TAB gesture).
    pub fn complete(&self, word: &str, style: TabStyle, repeated: bool) -> TabOutcome {
        let matches = self.matches(word);
        match matches.len() {
            0 => TabOutcome::Nothing,
            1 => TabOutcome::Fill(format!("{} ", matches[0])),
            _ => {
                let fill = longest_common_prefix(&matches);
                match style {
                    TabStyle::Fast => TabOutcome::List {
                        matches: matches.iter().map(|m| (*m).to_string()).collect(),
                        fill,
                    },
                    TabStyle::Classic => {
                        if fill.len() > word.len() {
                            TabOutcome::Fill(fill)
                        } else if repeated {
                            TabOutcome::List {
                                matches: matches.iter().map(|m| (*m).to_string()).collect(),
                                fill,
                            }
                        } else {
                            TabOutcome::Nothing
                        }
                    },
                }
            },
        }
    }
}

/// Longest common prefix of a non-empty candidate list.
pub fn longest_common_prefix(words: &[&str]) -> String {
    let Some(first) = words.first() else {
        return String::new();
    };
    let mut prefix = first.to_string();
    for word in &words[1..] {
        let common = prefix
            .chars()
            .zip(word.chars())
            .take_while(|(a, b)| a == b)
            .count();
        prefix.truncate(
            prefix
                .char_indices()
                .nth(common)
                .map_or(prefix.len(), |(i, _)| i),
        );
        if prefix.is_empty() {
            break;
        }
    }
    prefix
}

/// Candidates in padded columns sized from the longest name.
pub fn format_columns(matches: &[String]) -> String {
    let width = matches.iter().map(String::len).max().unwrap_or(0) + 2;
    let mut out = String::new();
    for (i, name) in matches.iter().enumerate() {
        out.push_str(&format!("{name:width$}"));
        if (i + 1) % LIST_COLUMNS == 0 && i + 1 != matches.len() {
            out.push_str("\r\n");
        }
    }
    out.push_str("\r\n");
    out
}
