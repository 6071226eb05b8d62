//! A single square of the grid and the set of letters it can still hold.

use crate::types::{
    letter_mask, letters_in_mask, CellId, Direction, EntryId, LetterMask, ALL_LETTERS, BLOCK_CHAR,
    EMPTY_CHAR,
};

/// What a cell currently contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellValue {
    Block,
    Empty,
    /// An uppercase ASCII letter.
    Letter(u8),
}

impl CellValue {
    #[must_use]
    pub fn to_char(self) -> char {
        match self {
            CellValue::Block => BLOCK_CHAR,
            CellValue::Empty => EMPTY_CHAR,
            CellValue::Letter(letter) => letter as char,
        }
    }
}

/// The mutable part of a cell, as captured by `Cell::checkpoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellState {
    value: CellValue,
    valid_letters: LetterMask,
}

impl CellState {
    #[must_use]
    pub fn valid_letters(&self) -> LetterMask {
        self.valid_letters
    }
}

/// Link from a cell to an entry that covers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef {
    pub entry_id: EntryId,
    /// Position of the cell within the entry.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    id: CellId,
    value: CellValue,
    valid_letters: LetterMask,
    across: Option<EntryRef>,
    down: Option<EntryRef>,
}

impl Cell {
    #[must_use]
    pub fn new(id: CellId, value: CellValue) -> Cell {
        let mut cell = Cell {
            id,
            value,
            valid_letters: 0,
            across: None,
            down: None,
        };
        cell.reset();
        cell
    }

    /// Reset the letter domain based only on the cell's own contents.
    pub fn reset(&mut self) {
        self.valid_letters = match self.value {
            CellValue::Block => 0,
            CellValue::Empty => ALL_LETTERS,
            CellValue::Letter(letter) => letter_mask(letter),
        };
    }

    /// Narrow the letter domain. This can only ever remove letters.
    pub fn apply_mask(&mut self, mask: LetterMask) {
        self.valid_letters &= mask;
    }

    /// Write a letter into the cell, narrowing its domain to match.
    pub fn set_letter(&mut self, letter: u8) {
        self.value = CellValue::Letter(letter);
        self.apply_mask(letter_mask(letter));
    }

    #[must_use]
    pub fn checkpoint(&self) -> CellState {
        CellState {
            value: self.value,
            valid_letters: self.valid_letters,
        }
    }

    pub fn restore(&mut self, state: CellState) {
        self.value = state.value;
        self.valid_letters = state.valid_letters;
    }

    #[must_use]
    pub fn id(&self) -> CellId {
        self.id
    }

    #[must_use]
    pub fn value(&self) -> CellValue {
        self.value
    }

    #[must_use]
    pub fn valid_letters(&self) -> LetterMask {
        self.valid_letters
    }

    #[must_use]
    pub fn is_block(&self) -> bool {
        self.value == CellValue::Block
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value == CellValue::Empty
    }

    /// The remaining letters, as a string (e.g. `"AEIOU"`).
    #[must_use]
    pub fn valid_letters_string(&self) -> String {
        letters_in_mask(self.valid_letters).map(char::from).collect()
    }

    #[must_use]
    pub fn entry(&self, direction: Direction) -> Option<EntryRef> {
        match direction {
            Direction::Across => self.across,
            Direction::Down => self.down,
        }
    }

    pub(crate) fn set_entry(&mut self, direction: Direction, entry_ref: EntryRef) {
        match direction {
            Direction::Across => self.across = Some(entry_ref),
            Direction::Down => self.down = Some(entry_ref),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset() {
        assert_eq!(Cell::new(0, CellValue::Empty).valid_letters(), ALL_LETTERS);
        assert_eq!(Cell::new(0, CellValue::Block).valid_letters(), 0);
        assert_eq!(
            Cell::new(0, CellValue::Letter(b'C')).valid_letters_string(),
            "C"
        );
    }

    #[test]
    fn test_apply_mask_only_narrows() {
        let mut cell = Cell::new(3, CellValue::Empty);
        cell.apply_mask(letter_mask(b'A') | letter_mask(b'B'));
        cell.apply_mask(letter_mask(b'B') | letter_mask(b'Z'));
        assert_eq!(cell.valid_letters_string(), "B");

        cell.apply_mask(ALL_LETTERS);
        assert_eq!(cell.valid_letters_string(), "B");
    }

    #[test]
    fn test_checkpoint_and_restore() {
        let mut cell = Cell::new(0, CellValue::Empty);
        let state = cell.checkpoint();

        cell.set_letter(b'Q');
        assert_eq!(cell.value(), CellValue::Letter(b'Q'));
        assert_eq!(cell.valid_letters(), letter_mask(b'Q'));

        cell.restore(state);
        assert_eq!(cell.checkpoint(), state);
        assert!(cell.is_empty());
    }
}
