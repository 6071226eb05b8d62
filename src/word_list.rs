//! The word list is the dictionary every fill draws from. Words are normalized to uppercase
//! ASCII, sorted by (length, descending score, text), and indexed by length so that "all words
//! of length N" is a contiguous range. Each word also carries one `LetterMask` per position so
//! that pattern tests are a handful of bitwise ANDs instead of string comparisons.

use fancy_regex::Regex;
use lazy_static::lazy_static;
use log::debug;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::path::Path;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::types::{letter_mask, LetterMask, WordId};
use crate::{DEFAULT_MIN_WORD_LENGTH, DEFAULT_SCORE, MAX_SLOT_LENGTH};

lazy_static! {
    /// A word, optionally followed by a score, separated by semicolons and/or whitespace.
    static ref WORD_LINE_RE: Regex =
        Regex::new(r"^\s*(?P<word>[^;\s]+)(?:[;\s]+(?P<score>\S+))?\s*$")
            .expect("word list line pattern should compile");
}

/// A single dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    /// Normalized (uppercase ASCII) text.
    pub text: String,
    pub score: i32,

    /// One single-bit mask per letter position.
    pub masks: SmallVec<[LetterMask; MAX_SLOT_LENGTH]>,
}

impl Word {
    fn new(text: String, score: i32) -> Word {
        let masks = text.bytes().map(letter_mask).collect();
        Word { text, score, masks }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

/// Error produced when a word list can't be loaded at all. Individual malformed lines are
/// never errors; they're just skipped.
#[derive(Debug)]
pub enum WordListError {
    Io(std::io::Error),
}

impl fmt::Display for WordListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WordListError::Io(error) => write!(f, "Can't read word list: {error}"),
        }
    }
}

impl std::error::Error for WordListError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WordListError::Io(error) => Some(error),
        }
    }
}

impl From<std::io::Error> for WordListError {
    fn from(error: std::io::Error) -> Self {
        WordListError::Io(error)
    }
}

/// Convert raw word text into the form we store: accents stripped, uppercase, `A-Z` only.
/// Returns `None` if anything else is left over.
#[must_use]
pub fn normalize_word(raw: &str) -> Option<String> {
    let normalized = raw
        .nfkd()
        .filter(|&c| !is_combining_mark(c))
        .collect::<String>()
        .to_uppercase();

    if normalized.is_empty() || !normalized.bytes().all(|b| b.is_ascii_uppercase()) {
        None
    } else {
        Some(normalized)
    }
}

/// Parse one word-list line into its word and score. Blank or malformed lines produce `None`.
#[must_use]
pub fn parse_line(line: &str) -> Option<(&str, i32)> {
    let captures = WORD_LINE_RE.captures(line).ok()??;
    let word = captures.name("word")?.as_str();
    let score = match captures.name("score") {
        Some(score) => score.as_str().parse::<i32>().ok()?,
        None => DEFAULT_SCORE,
    };
    Some((word, score))
}

/// An immutable, sorted, length-indexed dictionary.
#[derive(Debug, Clone)]
pub struct WordList {
    words: Vec<Word>,
    min_length: usize,

    /// `length_starts[n]` is the index of the first word whose length is at least `n`.
    length_starts: Vec<usize>,

    id_by_text: HashMap<String, WordId>,
}

impl WordList {
    /// Build a word list from `(word, score)` pairs, dropping words shorter than
    /// `DEFAULT_MIN_WORD_LENGTH`.
    pub fn build<I, S>(words_with_scores: I) -> WordList
    where
        I: IntoIterator<Item = (S, i32)>,
        S: AsRef<str>,
    {
        WordList::build_with_min_length(words_with_scores, DEFAULT_MIN_WORD_LENGTH)
    }

    /// Build a word list from `(word, score)` pairs, dropping words shorter than `min_length`
    /// and words that contain anything but letters. If a word appears more than once, its
    /// highest score wins.
    pub fn build_with_min_length<I, S>(words_with_scores: I, min_length: usize) -> WordList
    where
        I: IntoIterator<Item = (S, i32)>,
        S: AsRef<str>,
    {
        let mut best_scores: HashMap<String, i32> = HashMap::new();
        let mut dropped = 0_usize;

        for (raw, score) in words_with_scores {
            let Some(text) = normalize_word(raw.as_ref()) else {
                dropped += 1;
                continue;
            };
            if text.len() < min_length {
                dropped += 1;
                continue;
            }
            best_scores
                .entry(text)
                .and_modify(|existing| *existing = (*existing).max(score))
                .or_insert(score);
        }

        let mut words: Vec<Word> = best_scores
            .into_iter()
            .map(|(text, score)| Word::new(text, score))
            .collect();

        words.sort_by(|a, b| {
            a.len()
                .cmp(&b.len())
                .then(b.score.cmp(&a.score))
                .then_with(|| a.text.cmp(&b.text))
        });

        let max_length = words.last().map_or(0, Word::len);
        let mut length_starts = Vec::with_capacity(max_length + 2);
        let mut idx = 0;
        for length in 0..=max_length + 1 {
            while idx < words.len() && words[idx].len() < length {
                idx += 1;
            }
            length_starts.push(idx);
        }

        let id_by_text = words
            .iter()
            .enumerate()
            .map(|(id, word)| (word.text.clone(), id))
            .collect();

        debug!(
            "Built word list with {} words ({} dropped)",
            words.len(),
            dropped
        );

        WordList {
            words,
            min_length,
            length_starts,
            id_by_text,
        }
    }

    /// Parse the contents of a word-list file: one `word;score` or `word score` (or bare `word`)
    /// per line.
    #[must_use]
    pub fn parse(contents: &str) -> WordList {
        WordList::parse_with_min_length(contents, DEFAULT_MIN_WORD_LENGTH)
    }

    #[must_use]
    pub fn parse_with_min_length(contents: &str, min_length: usize) -> WordList {
        WordList::build_with_min_length(contents.lines().filter_map(parse_line), min_length)
    }

    /// Load and parse a word-list file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<WordList, WordListError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(WordList::parse(&contents))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[must_use]
    pub fn min_length(&self) -> usize {
        self.min_length
    }

    #[must_use]
    pub fn word(&self, word_id: WordId) -> &Word {
        &self.words[word_id]
    }

    #[must_use]
    pub fn word_at(&self, word_id: WordId) -> &str {
        &self.words[word_id].text
    }

    #[must_use]
    pub fn masks_of(&self, word_id: WordId) -> &[LetterMask] {
        &self.words[word_id].masks
    }

    /// Look up a word's score. The word is normalized first, so case and accents don't matter.
    #[must_use]
    pub fn score_of(&self, word: &str) -> Option<i32> {
        let text = normalize_word(word)?;
        self.id_by_text.get(&text).map(|&id| self.words[id].score)
    }

    /// Look up the id of an already-normalized word.
    #[must_use]
    pub fn id_of(&self, text: &str) -> Option<WordId> {
        self.id_by_text.get(text).copied()
    }

    /// The index of the first word of the given length, or `len()` if there are none.
    #[must_use]
    pub fn first_index_for_length(&self, length: usize) -> usize {
        let range = self.range_for_length(length);
        if range.is_empty() {
            self.words.len()
        } else {
            range.start
        }
    }

    /// The contiguous range of ids of words with exactly the given length.
    #[must_use]
    pub fn range_for_length(&self, length: usize) -> Range<usize> {
        if length + 1 >= self.length_starts.len() {
            return self.words.len()..self.words.len();
        }
        self.length_starts[length]..self.length_starts[length + 1]
    }
}
