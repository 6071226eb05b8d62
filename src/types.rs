//! Shared vocabulary for the rest of the crate: letter bitmasks, directions, and the small
//! value types handed back to callers.
//!
//! A `LetterMask` stores a set of letters as one bit per letter (`A` is bit 0, `Z` is bit 25),
//! so intersecting or merging letter domains is a single bitwise operation.

#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// A set of letters, one bit per letter of the alphabet.
pub type LetterMask = u32;

/// Index of a cell in a grid, in row-major order.
pub type CellId = usize;

/// Index of an entry (slot) in a grid, in creation order.
pub type EntryId = usize;

/// Index of a word in a `WordList`.
pub type WordId = usize;

/// Number of letters we know how to place in a cell.
pub const ALPHABET_SIZE: usize = 26;

/// The mask containing every letter.
pub const ALL_LETTERS: LetterMask = (1 << ALPHABET_SIZE) - 1;

/// Template character for a block (black square).
pub const BLOCK_CHAR: char = '#';

/// Template character for a cell with no letter yet.
pub const EMPTY_CHAR: char = '.';

/// Return the single-bit mask for an uppercase ASCII letter.
#[must_use]
pub fn letter_mask(letter: u8) -> LetterMask {
    debug_assert!(letter.is_ascii_uppercase(), "not a letter: {letter}");
    1 << (letter - b'A')
}

/// Return the uppercase ASCII letter for a bit position in a `LetterMask`.
#[must_use]
pub fn letter_for_bit(bit: usize) -> u8 {
    b'A' + bit as u8
}

/// Iterate over the letters contained in a mask, in alphabetical order.
pub fn letters_in_mask(mask: LetterMask) -> impl Iterator<Item = u8> {
    (0..ALPHABET_SIZE)
        .filter(move |&bit| mask & (1 << bit) != 0)
        .map(letter_for_bit)
}

/// The orientation of an entry.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Across,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Across, Direction::Down];

    /// Row and column step taken when walking along an entry in this direction.
    #[must_use]
    pub fn step(self) -> (usize, usize) {
        match self {
            Direction::Across => (0, 1),
            Direction::Down => (1, 0),
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = u8;

    /// Hosts (the CLI, JS) pass directions as `0` for across and `1` for down.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Across),
            1 => Ok(Direction::Down),
            other => Err(other),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Across => write!(f, "across"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A candidate word for a slot, as shown in suggestion lists.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillSuggestion {
    pub word: String,
    pub score: i32,
}

/// For each letter, how many live candidates would put it in a given cell. Lower counts mean
/// the letter is harder to support there.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LetterCounts(pub [usize; ALPHABET_SIZE]);

impl LetterCounts {
    /// The count for a letter (either case). Anything that isn't a letter has a count of 0.
    #[must_use]
    pub fn get(&self, letter: u8) -> usize {
        match letter.to_ascii_uppercase() {
            letter @ b'A'..=b'Z' => self.0[(letter - b'A') as usize],
            _ => 0,
        }
    }

    /// Letters with a non-zero count, most supported first.
    #[must_use]
    pub fn ranked(&self) -> Vec<(char, usize)> {
        let mut ranked: Vec<(char, usize)> = self
            .0
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(bit, &count)| (letter_for_bit(bit) as char, count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }
}
