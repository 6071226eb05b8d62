//! The grid owns every cell and entry of a puzzle and drives the fill process:
//!
//! - `satisfy_all` repeatedly asks each entry to prune itself until nothing changes, which is a
//!   cheap approximation of arc consistency over the crossings.
//!
//! - `fill_step` performs one step of a backtracking search that always branches on the
//!   incomplete entry with the fewest remaining candidates. Instead of recursing, the search
//!   keeps an explicit stack of frames, each holding a snapshot of the grid taken before its
//!   attempt, so that the caller can stop, resume, or abandon the search between any two steps.

use instant::{Duration, Instant};
use log::{debug, info, trace, warn};
use rand::Rng;
use smallvec::SmallVec;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::cell::{Cell, CellState, CellValue, EntryRef};
use crate::entry::{Entry, EntryState, UsedWords};
use crate::types::{
    letter_mask, CellId, Direction, EntryId, FillSuggestion, LetterCounts, WordId, ALPHABET_SIZE,
    BLOCK_CHAR, EMPTY_CHAR,
};
use crate::word_list::WordList;
use crate::{CHECK_INVARIANTS, MAX_SLOT_LENGTH};

/// Problems with a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    Empty,
    RaggedRows {
        row: usize,
        expected: usize,
        found: usize,
    },
    InvalidCharacter {
        row: usize,
        col: usize,
        found: char,
    },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::Empty => write!(f, "Grid must have at least one row"),
            TemplateError::RaggedRows {
                row,
                expected,
                found,
            } => write!(
                f,
                "Rows in grid must all be the same length (row {row} has {found} cells, expected {expected})"
            ),
            TemplateError::InvalidCharacter { row, col, found } => write!(
                f,
                "Invalid character {found:?} at row {row}, column {col}"
            ),
        }
    }
}

impl std::error::Error for TemplateError {}

/// Bad input to one of the grid's query methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillError {
    OutOfRange { x: usize, y: usize },
    InvalidDirection(u8),
}

impl fmt::Display for FillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillError::OutOfRange { x, y } => write!(f, "Cell ({x}, {y}) is out of range"),
            FillError::InvalidDirection(direction) => {
                write!(f, "Invalid direction {direction} (expected 0 or 1)")
            }
        }
    }
}

impl std::error::Error for FillError {}

/// Ways a synchronous fill can end without a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillFailure {
    /// The search was exhausted: there's no fill for this grid with this word list.
    Unsolvable,
    /// We ran out of time. The search state is kept, so filling again resumes it.
    Timeout,
    /// The fill was cancelled through its `CancelToken`.
    Abort,
}

impl fmt::Display for FillFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillFailure::Unsolvable => write!(f, "Unfillable grid"),
            FillFailure::Timeout => write!(f, "Timed out before finding a fill"),
            FillFailure::Abort => write!(f, "Fill was cancelled"),
        }
    }
}

impl std::error::Error for FillFailure {}

/// Where the search stands after a step. Everything but `Searching` is terminal.
#[cfg_attr(feature = "serde", derive(serde_derive::Serialize, serde_derive::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    Searching,
    Solved,
    Unsolvable,
    Aborted,
}

impl FillStatus {
    #[must_use]
    pub fn is_done(self) -> bool {
        self != FillStatus::Searching
    }
}

/// A struct tracking stats about the filling process.
#[cfg_attr(feature = "serde", derive(serde_derive::Serialize, serde_derive::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub states: usize,
    pub backtracks: usize,
    pub total_time: Duration,
}

/// A value copy of the mutable state of every cell and entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCheckpoint {
    cells: Vec<CellState>,
    entries: Vec<EntryState>,
}

/// One level of the search.
#[derive(Debug, Default)]
struct Frame {
    /// The entry we're branching on, once it's been chosen.
    entry_id: Option<EntryId>,

    /// The state from before this frame's current attempt, if it has made one.
    checkpoint: Option<GridCheckpoint>,

    /// Words that became used as a result of the current attempt.
    claimed: SmallVec<[WordId; 4]>,
}

/// Parse a template into its dimensions and initial cell contents.
pub fn parse_template(template: &str) -> Result<(usize, usize, Vec<CellValue>), TemplateError> {
    let normalized: String = template.nfkd().filter(|&c| !is_combining_mark(c)).collect();
    let rows: Vec<&str> = normalized.trim().lines().map(str::trim).collect();

    let Some(first_row) = rows.first() else {
        return Err(TemplateError::Empty);
    };
    let width = first_row.chars().count();
    if width == 0 {
        return Err(TemplateError::Empty);
    }

    let mut values = Vec::with_capacity(width * rows.len());
    for (row, line) in rows.iter().enumerate() {
        let found = line.chars().count();
        if found != width {
            return Err(TemplateError::RaggedRows {
                row,
                expected: width,
                found,
            });
        }
        for (col, c) in line.chars().enumerate() {
            values.push(match c {
                BLOCK_CHAR => CellValue::Block,
                EMPTY_CHAR => CellValue::Empty,
                c if c.is_ascii_alphabetic() => CellValue::Letter(c.to_ascii_uppercase() as u8),
                found => return Err(TemplateError::InvalidCharacter { row, col, found }),
            });
        }
    }

    Ok((width, rows.len(), values))
}

pub struct Grid {
    width: usize,
    height: usize,
    word_list: Arc<WordList>,
    cells: Vec<Cell>,
    entries: Vec<Entry>,
    used_words: UsedWords,

    frames: Vec<Frame>,
    started: bool,
    status: FillStatus,
    statistics: Statistics,
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("entries", &self.entries.len())
            .field("used_words", &self.used_words.count())
            .field("frames", &self.frames.len())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Grid {
    /// Build a grid from a template, creating an entry for every run of two or more open cells
    /// in each direction.
    pub fn new(template: &str, word_list: Arc<WordList>) -> Result<Grid, TemplateError> {
        let (width, height, values) = parse_template(template)?;

        let mut cells: Vec<Cell> = values
            .iter()
            .enumerate()
            .map(|(cell_id, &value)| Cell::new(cell_id, value))
            .collect();
        let mut used_words = UsedWords::new(word_list.len());
        let mut entries: Vec<Entry> = vec![];

        let is_open = |row: usize, col: usize| values[row * width + col] != CellValue::Block;

        for direction in Direction::ALL {
            let (row_step, col_step) = direction.step();

            for row in 0..height {
                for col in 0..width {
                    if !is_open(row, col) {
                        continue;
                    }
                    let at_start = match direction {
                        Direction::Across => col == 0 || !is_open(row, col - 1),
                        Direction::Down => row == 0 || !is_open(row - 1, col),
                    };
                    let (next_row, next_col) = (row + row_step, col + col_step);
                    let has_next = next_row < height && next_col < width && is_open(next_row, next_col);
                    if !at_start || !has_next {
                        continue;
                    }

                    let mut cell_ids: SmallVec<[CellId; MAX_SLOT_LENGTH]> = SmallVec::new();
                    let (mut r, mut c) = (row, col);
                    while r < height && c < width && is_open(r, c) {
                        cell_ids.push(r * width + c);
                        r += row_step;
                        c += col_step;
                    }

                    let entry_id = entries.len();
                    for (offset, &cell_id) in cell_ids.iter().enumerate() {
                        cells[cell_id].set_entry(direction, EntryRef { entry_id, offset });
                    }
                    entries.push(Entry::new(
                        entry_id,
                        direction,
                        cell_ids,
                        &mut cells,
                        &word_list,
                        &used_words,
                    ));
                }
            }
        }

        // Entries that are already complete are locked in place, and their words are off the
        // table for the rest of the grid.
        for entry in &mut entries {
            if entry.completed(&cells) {
                entry.lock();
                if let Some(word_id) = entry.current_word_id(&cells, &word_list) {
                    used_words.claim(word_id, entry.id());
                }
            }
        }

        debug!(
            "Built {width}x{height} grid with {} entries ({} locked)",
            entries.len(),
            entries.iter().filter(|entry| entry.is_locked()).count()
        );

        Ok(Grid {
            width,
            height,
            word_list,
            cells,
            entries,
            used_words,
            frames: vec![],
            started: false,
            status: FillStatus::Searching,
            statistics: Statistics::default(),
        })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn word_list(&self) -> &Arc<WordList> {
        &self.word_list
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[must_use]
    pub fn used_words(&self) -> &UsedWords {
        &self.used_words
    }

    #[must_use]
    pub fn status(&self) -> FillStatus {
        self.status
    }

    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Has the search taken its first step yet?
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Prune every entry until a full pass removes nothing. Returns true if anything was pruned.
    pub fn satisfy_all(&mut self) -> bool {
        let mut pruned = false;
        loop {
            let mut changed = false;
            for entry in &mut self.entries {
                changed |= entry.satisfy(&mut self.cells, &self.word_list, &self.used_words);
            }
            if !changed {
                return pruned;
            }
            pruned = true;
        }
    }

    /// The incomplete entry with the fewest candidates, preferring earlier entries on ties.
    #[must_use]
    pub fn next_fill_victim(&self) -> Option<EntryId> {
        self.entries
            .iter()
            .filter(|entry| !entry.completed(&self.cells))
            .min_by_key(|entry| entry.num_fills(&self.cells))
            .map(Entry::id)
    }

    /// A rough signal of how much freedom is left: 0 if some entry has no options, 1 if every
    /// entry is determined, otherwise the total number of candidates across entries. This is not
    /// a count of complete fills.
    #[must_use]
    pub fn num_fills(&self) -> usize {
        let mut total = 0;
        for entry in &self.entries {
            let fills = entry.num_fills(&self.cells);
            if fills == 0 {
                return 0;
            }
            total += fills;
        }
        if total == self.entries.len() {
            1
        } else {
            total
        }
    }

    #[must_use]
    pub fn checkpoint(&self) -> GridCheckpoint {
        GridCheckpoint {
            cells: self.cells.iter().map(Cell::checkpoint).collect(),
            entries: self.entries.iter().map(Entry::checkpoint).collect(),
        }
    }

    pub(crate) fn restore(&mut self, checkpoint: GridCheckpoint) {
        for (cell, state) in self.cells.iter_mut().zip(checkpoint.cells) {
            cell.restore(state);
        }
        for (entry, state) in self.entries.iter_mut().zip(checkpoint.entries) {
            entry.restore(state);
        }
    }

    /// Mark the words spelled by newly completed entries as used, returning the ones we claimed.
    fn claim_completed(&mut self) -> SmallVec<[WordId; 4]> {
        let mut claimed = SmallVec::new();
        for entry in &self.entries {
            if entry.is_locked() {
                continue;
            }
            let Some(word_id) = entry.current_word_id(&self.cells, &self.word_list) else {
                continue;
            };
            if self.used_words.owner(word_id).is_none() {
                self.used_words.claim(word_id, entry.id());
                claimed.push(word_id);
            }
        }
        claimed
    }

    fn release(&mut self, word_ids: &[WordId]) {
        for &word_id in word_ids {
            self.used_words.release(word_id);
        }
    }

    /// Fill every incomplete entry with its current candidate. Used once every entry is down to a
    /// single option; returns false, leaving the grid as it was, if the result isn't a valid fill.
    fn fill_forced(&mut self) -> bool {
        let checkpoint = self.checkpoint();
        for entry_id in 0..self.entries.len() {
            if self.entries[entry_id].completed(&self.cells) {
                continue;
            }
            if self.entries[entry_id]
                .fill(&mut self.cells, &self.word_list)
                .is_none()
            {
                self.restore(checkpoint);
                return false;
            }
        }

        let claimed = self.claim_completed();
        self.satisfy_all();
        if self.num_fills() == 1 {
            true
        } else {
            self.release(&claimed);
            self.restore(checkpoint);
            false
        }
    }

    /// Take one step of the search. Each step either undoes a failed attempt and moves to the
    /// next candidate, recognizes a dead end or a finished grid, or makes one new attempt.
    pub fn fill_step(&mut self) -> FillStatus {
        if self.status.is_done() {
            return self.status;
        }
        let start = Instant::now();
        self.statistics.states += 1;

        if !self.started {
            self.started = true;
            self.satisfy_all();
            self.frames.push(Frame::default());
            debug!("Starting search with {} estimated fills", self.num_fills());
        }

        self.status = self.advance();
        self.statistics.total_time += start.elapsed();

        if CHECK_INVARIANTS {
            self.check_invariants();
        }

        match self.status {
            FillStatus::Solved => info!("Found fill: {:?}", self.statistics),
            FillStatus::Unsolvable => info!("Grid is unfillable: {:?}", self.statistics),
            _ => {}
        }
        self.status
    }

    fn advance(&mut self) -> FillStatus {
        let Some(mut frame) = self.frames.pop() else {
            return FillStatus::Unsolvable;
        };

        // If this frame already tried a word, roll back to before that attempt and move on to
        // the entry's next candidate.
        if let Some(checkpoint) = frame.checkpoint.take() {
            self.restore(checkpoint);
            self.release(&frame.claimed);
            frame.claimed.clear();
            if let Some(entry_id) = frame.entry_id {
                self.entries[entry_id].next_word();
            }
            self.satisfy_all();
            self.statistics.backtracks += 1;
        }

        match self.num_fills() {
            0 => {
                trace!("Dead end at depth {}", self.frames.len());
                self.dead_end()
            }
            1 => {
                if self.fill_forced() {
                    self.frames.push(frame);
                    FillStatus::Solved
                } else {
                    trace!("Forced fill failed at depth {}", self.frames.len());
                    self.dead_end()
                }
            }
            _ => {
                let Some(entry_id) = frame.entry_id.or_else(|| self.next_fill_victim()) else {
                    return self.dead_end();
                };
                frame.entry_id = Some(entry_id);

                let checkpoint = self.checkpoint();
                let Some(word_id) = self.entries[entry_id].fill(&mut self.cells, &self.word_list)
                else {
                    trace!("Entry {entry_id} has no candidates left");
                    return self.dead_end();
                };
                trace!(
                    "Trying {} in entry {entry_id} at depth {}",
                    self.word_list.word_at(word_id),
                    self.frames.len()
                );

                frame.checkpoint = Some(checkpoint);
                frame.claimed = self.claim_completed();
                self.satisfy_all();

                self.frames.push(frame);
                self.frames.push(Frame::default());
                FillStatus::Searching
            }
        }
    }

    /// The current frame has been dropped; the search is over if there's nothing to go back to.
    fn dead_end(&self) -> FillStatus {
        if self.frames.is_empty() {
            FillStatus::Unsolvable
        } else {
            FillStatus::Searching
        }
    }

    /// Run the search until it finishes.
    pub fn fill(&mut self) -> FillStatus {
        while !self.fill_step().is_done() {}
        self.status
    }

    /// Stop the search for good.
    pub fn abort(&mut self) {
        if !self.status.is_done() {
            self.status = FillStatus::Aborted;
            self.frames.clear();
        }
    }

    /// Shuffle each entry's candidate order. This only makes sense before the search starts,
    /// since each frame remembers its position in its entry's candidate list.
    pub fn randomize<R: Rng + ?Sized>(&mut self, amount: f64, rng: &mut R) {
        if self.started {
            warn!("Ignoring request to randomize a grid whose search has started");
            return;
        }
        for entry in &mut self.entries {
            entry.randomize(amount, rng);
        }
    }

    fn cell_at(&self, x: usize, y: usize) -> Result<&Cell, FillError> {
        if x >= self.width || y >= self.height {
            return Err(FillError::OutOfRange { x, y });
        }
        Ok(&self.cells[y * self.width + x])
    }

    /// The entry running through the given cell in the given direction, if there is one.
    pub fn entry_at(
        &self,
        x: usize,
        y: usize,
        direction: Direction,
    ) -> Result<Option<&Entry>, FillError> {
        Ok(self
            .cell_at(x, y)?
            .entry(direction)
            .map(|entry_ref| &self.entries[entry_ref.entry_id]))
    }

    /// The live candidates for the entry through the given cell, best first. Blocks and cells
    /// with no entry in that direction have no candidates.
    pub fn get_fills(
        &self,
        x: usize,
        y: usize,
        direction: Direction,
    ) -> Result<Vec<FillSuggestion>, FillError> {
        Ok(self
            .entry_at(x, y, direction)?
            .map(|entry| entry.fills(&self.word_list))
            .unwrap_or_default())
    }

    /// For each letter, the smaller of the number of across and down candidates that would put
    /// it in the given cell.
    pub fn get_cell_letters(&self, x: usize, y: usize) -> Result<LetterCounts, FillError> {
        let cell = self.cell_at(x, y)?;
        let mut result: Option<[usize; ALPHABET_SIZE]> = None;

        for direction in Direction::ALL {
            let Some(EntryRef { entry_id, offset }) = cell.entry(direction) else {
                continue;
            };
            let counts = self.entries[entry_id].letter_counts(offset, &self.cells, &self.word_list);
            result = Some(match result {
                Some(mut existing) => {
                    for (existing, count) in existing.iter_mut().zip(counts) {
                        *existing = (*existing).min(count);
                    }
                    existing
                }
                None => counts,
            });
        }

        Ok(LetterCounts(result.unwrap_or_default()))
    }

    /// Verify that the used-word table matches the entries' contents, and that nothing has
    /// grown since the most recent saved checkpoint.
    fn check_invariants(&self) {
        for (word_id, entry_id) in self.used_words.iter() {
            let entry = &self.entries[entry_id];
            assert_eq!(
                entry.current_word_id(&self.cells, &self.word_list),
                Some(word_id),
                "Entry {entry_id} owns {} but contains {}",
                self.word_list.word_at(word_id),
                entry.pattern(&self.cells),
            );
        }
        for entry in &self.entries {
            if entry.is_locked() {
                continue;
            }
            let Some(word_id) = entry.current_word_id(&self.cells, &self.word_list) else {
                continue;
            };
            match self.used_words.owner(word_id) {
                Some(owner) if owner == entry.id() => {}
                Some(owner) => assert_eq!(
                    entry.num_fills(&self.cells),
                    0,
                    "Entry {} repeats {} from entry {owner} without being marked dead",
                    entry.id(),
                    self.word_list.word_at(word_id),
                ),
                None => panic!(
                    "Entry {} spells {} but doesn't own it",
                    entry.id(),
                    self.word_list.word_at(word_id)
                ),
            }
        }
        for cell in &self.cells {
            if let CellValue::Letter(letter) = cell.value() {
                assert!(
                    cell.valid_letters() & !letter_mask(letter) == 0,
                    "Cell {} holds {} but allows {}",
                    cell.id(),
                    letter as char,
                    cell.valid_letters_string(),
                );
            }
        }

        let Some(checkpoint) = self
            .frames
            .iter()
            .rev()
            .find_map(|frame| frame.checkpoint.as_ref())
        else {
            return;
        };
        for (cell, state) in self.cells.iter().zip(&checkpoint.cells) {
            assert!(
                cell.valid_letters() & !state.valid_letters() == 0,
                "Cell {} gained letters since the last checkpoint",
                cell.id(),
            );
        }
        for (entry, state) in self.entries.iter().zip(&checkpoint.entries) {
            let before: HashSet<WordId> = state.valid_words().iter().copied().collect();
            assert!(
                entry
                    .valid_words()
                    .iter()
                    .all(|word_id| before.contains(word_id)),
                "Entry {} gained candidates since the last checkpoint",
                entry.id(),
            );
        }
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.height {
            if row > 0 {
                writeln!(f)?;
            }
            for cell in &self.cells[row * self.width..(row + 1) * self.width] {
                write!(f, "{}", cell.value().to_char())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use proptest::prelude::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn word_list(words: &[&str]) -> Arc<WordList> {
        Arc::new(WordList::build(words.iter().map(|&word| (word, 50))))
    }

    /// Every entry must be complete and spell a distinct word from the list, except for
    /// entries that were complete in the template.
    fn assert_valid_fill(grid: &Grid) {
        let mut seen = HashSet::new();
        for entry in grid.entries() {
            assert!(entry.completed(grid.cells()), "Incomplete entry in\n{grid}");
            if entry.is_locked() {
                continue;
            }
            let pattern = entry.pattern(grid.cells());
            assert!(
                grid.word_list().id_of(&pattern).is_some(),
                "{pattern} isn't a word"
            );
            assert!(seen.insert(pattern.clone()), "{pattern} is used twice");
        }
    }

    fn square_word_list() -> Arc<WordList> {
        word_list(&["arc", "boa", "set", "abs", "roe", "cat", "ace", "bet"])
    }

    #[test]
    fn test_entry_discovery() {
        let grid = Grid::new(
            "
            ..#.
            ....
            #...
            .#..
            ",
            word_list(&[]),
        )
        .unwrap();

        let summary: Vec<(Direction, usize, usize)> = grid
            .entries()
            .iter()
            .map(|entry| (entry.direction(), entry.cell_ids()[0], entry.len()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (Direction::Across, 0, 2),
                (Direction::Across, 4, 4),
                (Direction::Across, 9, 3),
                (Direction::Across, 14, 2),
                (Direction::Down, 0, 2),
                (Direction::Down, 1, 3),
                (Direction::Down, 3, 4),
                (Direction::Down, 6, 3),
            ]
        );

        // Cell (0, 3) is unchecked in both directions.
        assert_eq!(grid.cells()[12].entry(Direction::Across), None);
        assert_eq!(grid.cells()[12].entry(Direction::Down), None);
        assert_eq!(
            grid.cells()[7].entry(Direction::Down),
            Some(EntryRef {
                entry_id: 6,
                offset: 1
            })
        );
    }

    #[test]
    fn test_template_errors() {
        assert_eq!(Grid::new("", word_list(&[])).unwrap_err(), TemplateError::Empty);
        assert_eq!(
            Grid::new("...\n..", word_list(&[])).unwrap_err(),
            TemplateError::RaggedRows {
                row: 1,
                expected: 3,
                found: 2
            }
        );
        assert_eq!(
            Grid::new("..?", word_list(&[])).unwrap_err(),
            TemplateError::InvalidCharacter {
                row: 0,
                col: 2,
                found: '?'
            }
        );
    }

    #[test]
    fn test_render_round_trip() {
        let template = "#a.\n..b\nc.#";
        let grid = Grid::new(template, word_list(&[])).unwrap();
        assert_eq!(grid.to_string(), "#A.\n..B\nC.#");
    }

    #[test]
    fn test_fill_two_letter_grid() {
        let word_list = Arc::new(WordList::parse_with_min_length(
            indoc! {"
                AT;50
                AS;40
                AA;30
                TS;20
            "},
            2,
        ));
        let mut grid = Grid::new("..#\n..#\n###", word_list).unwrap();

        assert_eq!(grid.fill(), FillStatus::Solved);
        assert_valid_fill(&grid);
        assert_eq!(grid.to_string(), "AT#\nAS#\n###");
    }

    #[test]
    fn test_two_letter_entries_need_two_letter_words() {
        let mut grid = Grid::new(
            "..#\n..#\n###",
            Arc::new(WordList::parse("AT;50\nAS;40\nAA;30\nTS;20")),
        )
        .unwrap();
        assert_eq!(grid.num_fills(), 0);
        assert_eq!(grid.fill(), FillStatus::Unsolvable);
    }

    #[test]
    fn test_missing_length_is_unsolvable() {
        let mut grid = Grid::new("...\n###\n###", word_list(&["abcd", "efgh"])).unwrap();
        assert_eq!(grid.num_fills(), 0);
        assert_eq!(grid.fill(), FillStatus::Unsolvable);
        assert_eq!(grid.fill_step(), FillStatus::Unsolvable);
    }

    #[test]
    fn test_conflicting_prefill_empties_crossing_entry() {
        let mut grid = Grid::new(
            "
            a..
            .##
            .##
            ",
            word_list(&["bat", "bee"]),
        )
        .unwrap();

        grid.satisfy_all();
        assert!(grid.entries().iter().all(|entry| entry.valid_words().is_empty()));
        assert_eq!(grid.num_fills(), 0);
        assert!(!grid.is_started());
        assert_eq!(grid.statistics().states, 0);
    }

    #[test]
    fn test_fills_are_pruned_before_satisfy_all() {
        let grid = Grid::new("c..\n###\n###", word_list(&["cat", "cot", "dog"])).unwrap();
        let fills: Vec<String> = grid
            .get_fills(2, 0, Direction::Across)
            .unwrap()
            .into_iter()
            .map(|suggestion| suggestion.word)
            .collect();
        assert_eq!(fills, vec!["CAT", "COT"]);

        assert_eq!(grid.get_fills(1, 0, Direction::Down).unwrap(), vec![]);
        assert_eq!(grid.get_fills(0, 1, Direction::Across).unwrap(), vec![]);
        assert_eq!(
            grid.get_fills(3, 0, Direction::Across),
            Err(FillError::OutOfRange { x: 3, y: 0 })
        );
    }

    #[test]
    fn test_fill_3x3_square() {
        let mut grid = Grid::new(
            "
            ...
            ...
            ...
            ",
            square_word_list(),
        )
        .unwrap();

        assert_eq!(grid.fill(), FillStatus::Solved);
        assert_valid_fill(&grid);
        assert!(grid.statistics().states > 0);
    }

    #[test]
    fn test_fill_partially_populated_square() {
        let mut grid = Grid::new(
            "
            ...
            ..e
            ...
            ",
            square_word_list(),
        )
        .unwrap();

        assert_eq!(grid.fill(), FillStatus::Solved);
        assert_valid_fill(&grid);
        assert_eq!(grid.to_string(), "ABS\nROE\nCAT");
    }

    #[test]
    fn test_words_are_not_reused() {
        let mut grid = Grid::new("...\n###\n...", word_list(&["cat"])).unwrap();
        assert_eq!(grid.fill(), FillStatus::Unsolvable);

        let mut grid = Grid::new("...\n###\n...", word_list(&["cat", "dog"])).unwrap();
        assert_eq!(grid.fill(), FillStatus::Solved);
        assert_valid_fill(&grid);
    }

    #[test]
    fn test_dupe_prevention_doesnt_affect_prefilled_entries() {
        let mut grid = Grid::new(
            "
            cat
            ###
            cat
            ###
            ...
            ",
            word_list(&["cat", "dog"]),
        )
        .unwrap();

        assert_eq!(grid.fill(), FillStatus::Solved);
        assert_eq!(grid.to_string(), "CAT\n###\nCAT\n###\nDOG");
    }

    #[test]
    fn test_prefilled_entries_outside_word_list_are_kept() {
        let mut grid = Grid::new("xyz\n###\n...", word_list(&["cat"])).unwrap();
        assert_eq!(grid.fill(), FillStatus::Solved);
        assert_eq!(grid.to_string(), "XYZ\n###\nCAT");
    }

    #[test]
    fn test_empty_grid_is_trivially_solved() {
        let mut grid = Grid::new("#.#\n###", word_list(&["cat"])).unwrap();
        assert!(grid.entries().is_empty());
        assert_eq!(grid.num_fills(), 1);
        assert_eq!(grid.fill(), FillStatus::Solved);
    }

    #[test]
    fn test_fill_fails_gracefully() {
        let mut grid = Grid::new(
            "
            ...
            ...
            ...
            ",
            word_list(&["arc", "boa", "set", "abs", "roe", "cax"]),
        )
        .unwrap();

        assert_eq!(grid.fill(), FillStatus::Unsolvable);
        assert_eq!(grid.status(), FillStatus::Unsolvable);
    }

    #[test]
    fn test_restore_matches_checkpoint() {
        let mut grid = Grid::new("...\n...\n...", square_word_list()).unwrap();
        grid.satisfy_all();
        let checkpoint = grid.checkpoint();
        let used_before = grid.used_words().clone();

        let entry_id = grid.next_fill_victim().unwrap();
        grid.entries[entry_id]
            .fill(&mut grid.cells, &grid.word_list)
            .unwrap();
        let claimed = grid.claim_completed();
        grid.satisfy_all();
        assert_ne!(grid.checkpoint(), checkpoint);

        grid.restore(checkpoint.clone());
        grid.release(&claimed);
        assert_eq!(grid.checkpoint(), checkpoint);
        assert_eq!(grid.used_words(), &used_before);
    }

    #[test]
    fn test_backtracking_restores_the_saved_checkpoint() {
        let mut grid = Grid::new(
            "...\n...\n...",
            word_list(&["arc", "boa", "set", "abs", "roe", "cax"]),
        )
        .unwrap();
        let mut compared = 0;

        loop {
            let pending = grid
                .frames
                .last()
                .and_then(|frame| Some((frame.entry_id?, frame.checkpoint.clone()?)));
            let backtracks = grid.statistics().backtracks;
            let depth = grid.frames.len();

            if grid.fill_step().is_done() {
                break;
            }
            let Some((entry_id, saved)) = pending else {
                continue;
            };
            assert_eq!(grid.statistics().backtracks, backtracks + 1);

            // If the entry had another candidate, the frame was pushed back with a fresh
            // checkpoint of the restored state.
            if grid.frames.len() != depth + 1 {
                continue;
            }
            let retried = grid.frames[depth - 1].checkpoint.as_ref().unwrap();
            assert_eq!(retried.cells, saved.cells);
            for (id, (after, before)) in retried.entries.iter().zip(&saved.entries).enumerate() {
                assert_eq!(after.valid_words(), before.valid_words());
                let advanced = usize::from(id == entry_id);
                assert_eq!(after.fill_index(), before.fill_index() + advanced);
            }
            compared += 1;
        }

        assert_eq!(grid.status(), FillStatus::Unsolvable);
        assert!(compared > 0);
    }

    #[test]
    fn test_invariants_hold_after_every_step() {
        let cases: [(&str, &[&str]); 6] = [
            ("...\n...\n...", &["arc", "boa", "set", "abs", "roe", "cat", "ace", "bet"]),
            ("...\n...\n...", &["arc", "boa", "set", "abs", "roe", "cax"]),
            ("...\n..e\n...", &["arc", "boa", "set", "abs", "roe", "cat", "ace", "bet"]),
            ("cat\n###\ncat\n###\n...", &["cat", "dog"]),
            ("...\n###\n...", &["cat"]),
            ("...\n###\n...", &["cat", "dog"]),
        ];

        for (template, words) in cases {
            let mut grid = Grid::new(template, word_list(words)).unwrap();
            grid.check_invariants();
            while !grid.fill_step().is_done() {
                grid.check_invariants();
            }
            grid.check_invariants();
        }

        for seed in 0..5 {
            let mut grid = Grid::new("...\n...\n...", square_word_list()).unwrap();
            grid.randomize(1.0, &mut SmallRng::seed_from_u64(seed));
            while !grid.fill_step().is_done() {
                grid.check_invariants();
            }
            grid.check_invariants();
        }
    }

    #[test]
    fn test_failed_forced_fill_leaves_grid_untouched() {
        let mut grid = Grid::new("...\n###\n...", word_list(&["cat"])).unwrap();
        assert_eq!(grid.fill(), FillStatus::Unsolvable);
        assert_eq!(grid.to_string(), "...\n###\n...");
        assert_eq!(grid.used_words().count(), 0);
    }

    #[test]
    #[should_panic(expected = "spells CAT but doesn't own it")]
    fn test_invariants_catch_unclaimed_words() {
        let mut grid = Grid::new("...\n###\n###", word_list(&["cat"])).unwrap();
        for (cell_id, letter) in b"CAT".iter().enumerate() {
            grid.cells[cell_id].set_letter(*letter);
        }
        grid.check_invariants();
    }

    #[test]
    fn test_satisfy_all_is_idempotent() {
        let mut grid = Grid::new("...\n...\n...", square_word_list()).unwrap();
        grid.satisfy_all();
        let checkpoint = grid.checkpoint();
        assert!(!grid.satisfy_all());
        assert_eq!(grid.checkpoint(), checkpoint);
    }

    #[test]
    fn test_step_by_step() {
        let mut grid = Grid::new("...\n...\n...", square_word_list()).unwrap();
        let mut steps = 0;
        while grid.fill_step() == FillStatus::Searching {
            steps += 1;
            assert!(steps < 10_000, "Search didn't terminate");
        }
        assert_eq!(grid.status(), FillStatus::Solved);
        assert_eq!(grid.statistics().states, steps + 1);
        assert_valid_fill(&grid);

        // Terminal states are sticky.
        assert_eq!(grid.fill_step(), FillStatus::Solved);
    }

    #[test]
    fn test_abort() {
        let mut grid = Grid::new("...\n...\n...", square_word_list()).unwrap();
        grid.fill_step();
        grid.abort();
        assert_eq!(grid.fill_step(), FillStatus::Aborted);
    }

    #[test]
    fn test_randomized_fill_is_still_valid() {
        for seed in 0..5 {
            let mut grid = Grid::new("...\n...\n...", square_word_list()).unwrap();
            grid.randomize(1.0, &mut SmallRng::seed_from_u64(seed));
            assert_eq!(grid.fill(), FillStatus::Solved);
            assert_valid_fill(&grid);
        }
    }

    #[test]
    fn test_cell_letters() {
        let grid = Grid::new(
            "
            ...
            .##
            .##
            ",
            word_list(&["cat", "cot", "dog", "cab", "dot"]),
        )
        .unwrap();

        // Across and down both have {CAT, COT, DOG, CAB, DOT} at their shared first cell.
        let counts = grid.get_cell_letters(0, 0).unwrap();
        assert_eq!(counts.get(b'C'), 3);
        assert_eq!(counts.get(b'D'), 2);
        assert_eq!(counts.get(b'Z'), 0);

        let counts = grid.get_cell_letters(1, 0).unwrap();
        assert_eq!(counts.get(b'O'), 3);
        assert_eq!(counts.get(b'A'), 2);

        assert_eq!(grid.get_cell_letters(1, 1).unwrap(), LetterCounts::default());
        assert!(grid.get_cell_letters(0, 3).is_err());
    }

    fn arbitrary_template() -> impl Strategy<Value = String> {
        (2_usize..5, 2_usize..5).prop_flat_map(|(width, height)| {
            proptest::collection::vec(prop_oneof![3 => Just('.'), 1 => Just('#')], width * height)
                .prop_map(move |chars| {
                    chars
                        .chunks(width)
                        .map(|row| row.iter().collect::<String>())
                        .collect::<Vec<_>>()
                        .join("\n")
                })
        })
    }

    proptest! {
        #[test]
        fn test_propagation_only_narrows(template in arbitrary_template()) {
            let mut grid = Grid::new(
                &template,
                word_list(&["arc", "boa", "set", "abs", "roe", "cat", "tabs", "acts", "oats", "bot"]),
            )
            .unwrap();

            let cells_before: Vec<_> = grid.cells().iter().map(Cell::valid_letters).collect();
            let words_before: Vec<Vec<WordId>> =
                grid.entries().iter().map(|entry| entry.valid_words().to_vec()).collect();

            grid.satisfy_all();

            for (cell, before) in grid.cells().iter().zip(cells_before) {
                prop_assert_eq!(cell.valid_letters() & !before, 0);
            }
            for (entry, before) in grid.entries().iter().zip(words_before) {
                prop_assert!(entry.valid_words().iter().all(|word_id| before.contains(word_id)));
            }

            let checkpoint = grid.checkpoint();
            prop_assert!(!grid.satisfy_all());
            prop_assert_eq!(grid.checkpoint(), checkpoint);
        }
    }
}
