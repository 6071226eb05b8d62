//! An entry is a single across or down slot. It keeps the list of dictionary words that could
//! still go there, and it's responsible for the two halves of constraint propagation:
//!
//! - Pruning its own candidates against the letter domains of its cells (which its crossing
//!   entries have been narrowing) and against words already in use elsewhere in the grid.
//!
//! - Narrowing the letter domains of its cells to the letters its surviving candidates can
//!   actually put there, which in turn prunes the crossing entries.

use rand::Rng;
use smallvec::{smallvec, SmallVec};

use crate::cell::{Cell, CellValue};
use crate::types::{
    letter_mask, CellId, Direction, EntryId, FillSuggestion, LetterMask, WordId, ALPHABET_SIZE,
};
use crate::word_list::WordList;
use crate::MAX_SLOT_LENGTH;

/// Which entry, if any, currently owns each word in the word list. A word can only be used by
/// one entry at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedWords {
    owners: Vec<Option<EntryId>>,
}

impl UsedWords {
    #[must_use]
    pub fn new(word_count: usize) -> UsedWords {
        UsedWords {
            owners: vec![None; word_count],
        }
    }

    #[must_use]
    pub fn owner(&self, word_id: WordId) -> Option<EntryId> {
        self.owners[word_id]
    }

    /// Can the given entry consider this word?
    #[must_use]
    pub fn is_available_to(&self, word_id: WordId, entry_id: EntryId) -> bool {
        self.owners[word_id].map_or(true, |owner| owner == entry_id)
    }

    /// Record that an entry holds a word. Returns false if another entry already owns it.
    pub fn claim(&mut self, word_id: WordId, entry_id: EntryId) -> bool {
        match self.owners[word_id] {
            Some(owner) => owner == entry_id,
            None => {
                self.owners[word_id] = Some(entry_id);
                true
            }
        }
    }

    pub fn release(&mut self, word_id: WordId) {
        self.owners[word_id] = None;
    }

    /// Iterate over `(word, owner)` pairs for every word in use.
    pub fn iter(&self) -> impl Iterator<Item = (WordId, EntryId)> + '_ {
        self.owners
            .iter()
            .enumerate()
            .filter_map(|(word_id, owner)| owner.map(|owner| (word_id, owner)))
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.owners.iter().flatten().count()
    }
}

/// The mutable part of an entry, as captured by `Entry::checkpoint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryState {
    valid_words: Vec<WordId>,
    fill_index: usize,
}

impl EntryState {
    #[must_use]
    pub fn valid_words(&self) -> &[WordId] {
        &self.valid_words
    }

    #[must_use]
    pub fn fill_index(&self) -> usize {
        self.fill_index
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    id: EntryId,
    direction: Direction,
    cell_ids: SmallVec<[CellId; MAX_SLOT_LENGTH]>,

    /// Ids of the words that could still fill this entry, in the order we'll try them.
    valid_words: Vec<WordId>,

    /// Position in `valid_words` of the candidate we'll try next.
    fill_index: usize,

    /// Was this entry already complete in the template? Locked entries count as determined
    /// even if their contents aren't in the word list.
    locked: bool,
}

impl Entry {
    /// Create an entry covering the given cells, seeded with every word of the right length,
    /// and run one round of pruning against the current state of the cells.
    pub fn new(
        id: EntryId,
        direction: Direction,
        cell_ids: SmallVec<[CellId; MAX_SLOT_LENGTH]>,
        cells: &mut [Cell],
        word_list: &WordList,
        used_words: &UsedWords,
    ) -> Entry {
        let mut entry = Entry {
            id,
            direction,
            valid_words: word_list.range_for_length(cell_ids.len()).collect(),
            cell_ids,
            fill_index: 0,
            locked: false,
        };
        entry.satisfy(cells, word_list, used_words);
        entry
    }

    /// Prune candidates that no longer fit the cells' letter domains or that are in use by
    /// another entry, then narrow each cell's domain to the letters the survivors allow there.
    /// Returns true if any candidates were removed.
    pub fn satisfy(&mut self, cells: &mut [Cell], word_list: &WordList, used_words: &UsedWords) -> bool {
        let length = self.cell_ids.len();
        let pattern: SmallVec<[LetterMask; MAX_SLOT_LENGTH]> = self
            .cell_ids
            .iter()
            .map(|&cell_id| cells[cell_id].valid_letters())
            .collect();

        let original_count = self.valid_words.len();
        let entry_id = self.id;
        self.valid_words.retain(|&word_id| {
            let masks = word_list.masks_of(word_id);
            used_words.is_available_to(word_id, entry_id)
                && masks.len() == length
                && masks.iter().zip(&pattern).all(|(mask, allowed)| mask & allowed != 0)
        });

        // A complete entry's cells already hold exactly its pattern.
        if !self.completed(cells) {
            let mut unions: SmallVec<[LetterMask; MAX_SLOT_LENGTH]> = smallvec![0; length];
            for &word_id in &self.valid_words {
                for (union, mask) in unions.iter_mut().zip(word_list.masks_of(word_id)) {
                    *union |= mask;
                }
            }
            for (&cell_id, &union) in self.cell_ids.iter().zip(&unions) {
                cells[cell_id].apply_mask(union);
            }
        }

        self.valid_words.len() != original_count
    }

    /// Write the current candidate into the cells. Returns `None` if we've run out of
    /// candidates.
    pub fn fill(&self, cells: &mut [Cell], word_list: &WordList) -> Option<WordId> {
        let &word_id = self.valid_words.get(self.fill_index)?;
        for (&cell_id, &letter) in self
            .cell_ids
            .iter()
            .zip(word_list.word_at(word_id).as_bytes())
        {
            cells[cell_id].set_letter(letter);
        }
        Some(word_id)
    }

    /// Move on to the next candidate.
    pub fn next_word(&mut self) {
        self.fill_index += 1;
    }

    /// A rough measure of how constrained this entry is; only meaningful for ranking.
    #[must_use]
    pub fn num_fills(&self, cells: &[Cell]) -> usize {
        if self.completed(cells) {
            // An entry completed by its crossings is only viable if it spells an available word.
            usize::from(self.locked || !self.valid_words.is_empty())
        } else {
            self.valid_words.len()
        }
    }

    #[must_use]
    pub fn completed(&self, cells: &[Cell]) -> bool {
        self.cell_ids
            .iter()
            .all(|&cell_id| !cells[cell_id].is_empty())
    }

    /// The current contents of the entry, with `.` for empty cells.
    #[must_use]
    pub fn pattern(&self, cells: &[Cell]) -> String {
        self.cell_ids
            .iter()
            .map(|&cell_id| cells[cell_id].value().to_char())
            .collect()
    }

    /// The id of the word this entry currently spells, if it's complete and in the word list.
    #[must_use]
    pub fn current_word_id(&self, cells: &[Cell], word_list: &WordList) -> Option<WordId> {
        if self.completed(cells) {
            word_list.id_of(&self.pattern(cells))
        } else {
            None
        }
    }

    /// The live candidates for this entry, best first.
    #[must_use]
    pub fn fills(&self, word_list: &WordList) -> Vec<FillSuggestion> {
        self.valid_words
            .iter()
            .map(|&word_id| {
                let word = word_list.word(word_id);
                FillSuggestion {
                    word: word.text.clone(),
                    score: word.score,
                }
            })
            .collect()
    }

    /// How many live candidates put each letter at the given position. A filled cell counts as
    /// a single option for its own letter.
    #[must_use]
    pub fn letter_counts(
        &self,
        offset: usize,
        cells: &[Cell],
        word_list: &WordList,
    ) -> [usize; ALPHABET_SIZE] {
        let mut counts = [0; ALPHABET_SIZE];
        if let CellValue::Letter(letter) = cells[self.cell_ids[offset]].value() {
            counts[letter_mask(letter).trailing_zeros() as usize] = 1;
            return counts;
        }
        for &word_id in &self.valid_words {
            counts[word_list.masks_of(word_id)[offset].trailing_zeros() as usize] += 1;
        }
        counts
    }

    /// Shuffle the candidate order a little: `amount` is the number of random swaps to make,
    /// as a fraction of the candidate count, clamped to `0.0..=1.0` (NaN counts as 0). The set
    /// of candidates never changes.
    pub fn randomize<R: Rng + ?Sized>(&mut self, amount: f64, rng: &mut R) {
        let count = self.valid_words.len();
        if count < 2 || amount.is_nan() {
            return;
        }
        let swaps = (amount.clamp(0.0, 1.0) * count as f64).round() as usize;
        for _ in 0..swaps {
            let a = rng.gen_range(0..count);
            let b = rng.gen_range(0..count);
            self.valid_words.swap(a, b);
        }
    }

    #[must_use]
    pub fn checkpoint(&self) -> EntryState {
        EntryState {
            valid_words: self.valid_words.clone(),
            fill_index: self.fill_index,
        }
    }

    pub fn restore(&mut self, state: EntryState) {
        self.valid_words = state.valid_words;
        self.fill_index = state.fill_index;
    }

    #[must_use]
    pub fn id(&self) -> EntryId {
        self.id
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn cell_ids(&self) -> &[CellId] {
        &self.cell_ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cell_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cell_ids.is_empty()
    }

    #[must_use]
    pub fn valid_words(&self) -> &[WordId] {
        &self.valid_words
    }

    #[must_use]
    pub fn fill_index(&self) -> usize {
        self.fill_index
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn lock(&mut self) {
        self.locked = true;
    }
}
