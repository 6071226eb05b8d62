#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::comparison_chain)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#[cfg(target_arch = "wasm32")]
use wee_alloc::WeeAlloc;

#[cfg(target_arch = "wasm32")]
#[global_allocator]
static ALLOC: WeeAlloc = WeeAlloc::INIT;

#[cfg(target_arch = "wasm32")]
#[inline]
pub fn set_panic_hook() {
    // When the `console_error_panic_hook` feature is enabled, we can call the
    // `set_panic_hook` function to get better error messages if we ever panic.
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

pub mod cell;
pub mod entry;
pub mod filler;
pub mod grid;
pub mod types;
pub mod word_list;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use filler::{CancelToken, FillProgress, FillSteps, Filler};
pub use grid::{FillError, FillFailure, FillStatus, Grid, Statistics, TemplateError};
pub use types::{Direction, FillSuggestion, LetterCounts};
pub use word_list::{WordList, WordListError};

/// The expected maximum length for a single slot. Longer slots still work, they just spill
/// their per-position data onto the heap.
pub const MAX_SLOT_LENGTH: usize = 21;

/// How many search steps do we take between checks of the deadline and the cancel token when
/// filling synchronously?
pub const INTERRUPT_FREQUENCY: usize = 10;

/// Score assigned to word-list lines that don't specify one.
pub const DEFAULT_SCORE: i32 = 50;

/// Words shorter than this are dropped when building a word list, matching conventional
/// crossword rules.
pub const DEFAULT_MIN_WORD_LENGTH: usize = 3;

/// Should we run (expensive) checks of the grid's invariants after every search step?
pub const CHECK_INVARIANTS: bool = cfg!(feature = "check_invariants");
