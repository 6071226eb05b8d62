//! The public face of the engine. A `Filler` owns one live grid built from a template plus the
//! shared word list, and offers three ways to run the search:
//!
//! - `fill` / `fill_with_timeout` block until the search finishes.
//! - `steps` returns an iterator that performs exactly one search step per `next()`, so a host
//!   event loop can interleave its own work between steps.
//! - `cancel_token` hands out a token that stops either of the above from another thread or
//!   callback.

use instant::{Duration, Instant};
use log::debug;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::grid::{FillError, FillFailure, FillStatus, Grid, Statistics, TemplateError};
use crate::types::{Direction, FillSuggestion, LetterCounts};
use crate::word_list::WordList;
use crate::INTERRUPT_FREQUENCY;

/// A shareable flag that asks a running fill to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The state of the grid after one step of the search.
#[cfg_attr(feature = "serde", derive(serde_derive::Serialize, serde_derive::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillProgress {
    pub status: FillStatus,
    /// The grid as template text, including any letters placed so far.
    pub grid: String,
}

#[derive(Debug)]
pub struct Filler {
    word_list: Arc<WordList>,
    grid: Grid,
    cancel_token: CancelToken,
}

impl Filler {
    pub fn new(template: &str, word_list: Arc<WordList>) -> Result<Filler, TemplateError> {
        Ok(Filler {
            grid: Grid::new(template, Arc::clone(&word_list))?,
            word_list,
            cancel_token: CancelToken::new(),
        })
    }

    /// Replace the grid with one built from a new template, throwing away any search progress.
    /// Tokens handed out for the old grid no longer have any effect.
    pub fn update_grid(&mut self, template: &str) -> Result<(), TemplateError> {
        self.grid = Grid::new(template, Arc::clone(&self.word_list))?;
        self.cancel_token = CancelToken::new();
        Ok(())
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[must_use]
    pub fn word_list(&self) -> &Arc<WordList> {
        &self.word_list
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel_token.clone()
    }

    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        self.grid.statistics()
    }

    /// Shuffle candidate order before filling, for variety. `amount` is the number of random
    /// swaps per entry as a fraction of its candidate count, clamped to `0.0..=1.0`. Has no
    /// effect once the search has started.
    pub fn randomize(&mut self, amount: f64, seed: Option<u64>) {
        let mut rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        self.grid.randomize(amount, &mut rng);
    }

    /// Search until the grid is filled, returning it as template text.
    pub fn fill(&mut self) -> Result<String, FillFailure> {
        self.fill_with_timeout(None)
    }

    /// Search until the grid is filled or the timeout passes. A timed-out search can be resumed
    /// by calling this again.
    pub fn fill_with_timeout(&mut self, timeout: Option<Duration>) -> Result<String, FillFailure> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut steps: usize = 0;

        loop {
            if steps % INTERRUPT_FREQUENCY == 0 {
                if self.cancel_token.is_cancelled() {
                    self.grid.abort();
                }
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        debug!("Fill timed out after {steps} steps");
                        return Err(FillFailure::Timeout);
                    }
                }
            }
            steps += 1;

            match self.grid.fill_step() {
                FillStatus::Searching => {}
                FillStatus::Solved => return Ok(self.grid.to_string()),
                FillStatus::Unsolvable => return Err(FillFailure::Unsolvable),
                FillStatus::Aborted => return Err(FillFailure::Abort),
            }
        }
    }

    /// Step through the search one unit of work at a time, optionally shuffling candidate order
    /// first.
    pub fn steps(&mut self, randomize_amount: Option<f64>) -> FillSteps<'_> {
        if let Some(amount) = randomize_amount {
            self.randomize(amount, None);
        }
        FillSteps {
            filler: self,
            finished: false,
        }
    }

    /// Take a single search step, honoring the cancel token.
    pub fn step(&mut self) -> FillProgress {
        if self.cancel_token.is_cancelled() {
            self.grid.abort();
        }
        FillProgress {
            status: self.grid.fill_step(),
            grid: self.grid.to_string(),
        }
    }

    /// The candidates for the entry through a cell, bringing propagation up to date first.
    pub fn get_fills(
        &mut self,
        x: usize,
        y: usize,
        direction: Direction,
    ) -> Result<Vec<FillSuggestion>, FillError> {
        self.grid.satisfy_all();
        self.grid.get_fills(x, y, direction)
    }

    /// Like `get_fills`, with the direction given as `0` (across) or `1` (down).
    pub fn get_fills_by_index(
        &mut self,
        x: usize,
        y: usize,
        direction: u8,
    ) -> Result<Vec<FillSuggestion>, FillError> {
        let direction = Direction::try_from(direction).map_err(FillError::InvalidDirection)?;
        self.get_fills(x, y, direction)
    }

    pub fn get_cell_letters(&mut self, x: usize, y: usize) -> Result<LetterCounts, FillError> {
        self.grid.satisfy_all();
        self.grid.get_cell_letters(x, y)
    }

    /// A rough signal of how open the grid is; 0 means it can't be filled as it stands.
    #[must_use]
    pub fn estimated_fills(&self) -> usize {
        self.grid.num_fills()
    }
}

/// An iterator that advances a fill by one search step per item. It ends after yielding a
/// terminal status and can't be restarted.
#[derive(Debug)]
pub struct FillSteps<'a> {
    filler: &'a mut Filler,
    finished: bool,
}

impl FillSteps<'_> {
    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.filler.grid
    }
}

impl Iterator for FillSteps<'_> {
    type Item = FillProgress;

    fn next(&mut self) -> Option<FillProgress> {
        if self.finished {
            return None;
        }
        let progress = self.filler.step();
        self.finished = progress.status.is_done();
        Some(progress)
    }
}

impl FusedIterator for FillSteps<'_> {}
