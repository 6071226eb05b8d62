use std::sync::Arc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::console;

use crate::filler::Filler;
use crate::grid::FillStatus;
use crate::word_list::WordList;
use crate::DEFAULT_MIN_WORD_LENGTH;

#[wasm_bindgen(start)]
pub fn initialize() {
    crate::set_panic_hook();
}

fn js_error(value: &JsValue) -> JsError {
    JsError::new(&value.as_string().unwrap_or_else(|| format!("{value:?}")))
}

/// Load word list contents from a URL or a file path.
async fn load_word_list_source(source: &str) -> Result<String, JsError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let window = web_sys::window().ok_or_else(|| JsError::new("No window to fetch from"))?;
        let response = wasm_bindgen_futures::JsFuture::from(window.fetch_with_str(source))
            .await
            .map_err(|e| js_error(&e))?;
        let response: web_sys::Response = response
            .dyn_into()
            .map_err(|_| JsError::new("Fetch didn't return a response"))?;
        if !response.ok() {
            return Err(JsError::new("Network response was not OK"));
        }
        let text = wasm_bindgen_futures::JsFuture::from(response.text().map_err(|e| js_error(&e))?)
            .await
            .map_err(|e| js_error(&e))?;
        text.as_string()
            .ok_or_else(|| JsError::new("Word list response wasn't text"))
    } else {
        std::fs::read_to_string(source)
            .map_err(|e| JsError::new(&format!("Failed to read file: {e}")))
    }
}

fn build_word_list(contents: &str, min_length: Option<usize>) -> Result<Arc<WordList>, JsError> {
    let word_list = WordList::parse_with_min_length(
        contents,
        min_length.unwrap_or(DEFAULT_MIN_WORD_LENGTH),
    );
    if word_list.is_empty() {
        return Err(JsError::new("Word list is empty"));
    }
    Ok(Arc::new(word_list))
}

/// Fill a grid in one go, loading the word list from a URL or file path.
#[wasm_bindgen]
pub async fn fill_grid(
    template: &str,
    word_list_source: String,
    min_length: Option<usize>,
) -> Result<String, JsError> {
    let contents = load_word_list_source(&word_list_source).await?;
    let word_list = build_word_list(&contents, min_length)?;

    let mut filler =
        Filler::new(template, word_list).map_err(|e| JsError::new(&e.to_string()))?;
    let result = filler.fill();

    console::log_1(&JsValue::from_str(&format!(
        "Fill finished after {} states",
        filler.statistics().states
    )));

    result.map_err(|e| JsError::new(&e.to_string()))
}

/// A filler that a JS event loop drives one step at a time, yielding between steps.
#[wasm_bindgen]
pub struct WasmFiller {
    filler: Filler,
}

#[wasm_bindgen]
impl WasmFiller {
    #[wasm_bindgen(constructor)]
    pub fn new(
        template: &str,
        word_list_contents: &str,
        min_length: Option<usize>,
    ) -> Result<WasmFiller, JsError> {
        let word_list = build_word_list(word_list_contents, min_length)?;
        let filler =
            Filler::new(template, word_list).map_err(|e| JsError::new(&e.to_string()))?;
        Ok(WasmFiller { filler })
    }

    /// Take one search step. Returns `"searching"`, `"solved"`, `"unsolvable"`, or `"aborted"`.
    pub fn step(&mut self) -> String {
        let progress = self.filler.step();
        let status = match progress.status {
            FillStatus::Searching => "searching",
            FillStatus::Solved => "solved",
            FillStatus::Unsolvable => "unsolvable",
            FillStatus::Aborted => "aborted",
        };
        if progress.status.is_done() {
            console::log_1(&JsValue::from_str(&format!(
                "Fill {status}: {:?}",
                self.filler.statistics()
            )));
        }
        status.to_string()
    }

    pub fn grid(&self) -> String {
        self.filler.grid().to_string()
    }

    /// Candidates for the entry through a cell, one `WORD;score` per line.
    #[wasm_bindgen(js_name = getFills)]
    pub fn get_fills(&mut self, x: usize, y: usize, direction: u8) -> Result<String, JsError> {
        let fills = self
            .filler
            .get_fills_by_index(x, y, direction)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(fills
            .iter()
            .map(|fill| format!("{};{}", fill.word, fill.score))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Letters the cell can still take, most supported first, one `LETTER;count` per line.
    #[wasm_bindgen(js_name = getCellLetters)]
    pub fn get_cell_letters(&mut self, x: usize, y: usize) -> Result<String, JsError> {
        let counts = self
            .filler
            .get_cell_letters(x, y)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(counts
            .ranked()
            .iter()
            .map(|(letter, count)| format!("{letter};{count}"))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    #[wasm_bindgen(js_name = estimatedFills)]
    pub fn estimated_fills(&self) -> usize {
        self.filler.estimated_fills()
    }

    #[wasm_bindgen(js_name = updateGrid)]
    pub fn update_grid(&mut self, template: &str) -> Result<(), JsError> {
        self.filler
            .update_grid(template)
            .map_err(|e| JsError::new(&e.to_string()))
    }

    pub fn randomize(&mut self, amount: f64, seed: Option<u32>) {
        self.filler.randomize(amount, seed.map(u64::from));
    }

    pub fn cancel(&self) {
        self.filler.cancel_token().cancel();
    }
}
