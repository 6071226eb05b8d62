use clap::Parser;
use log::info;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use xwfill_core::{
    Direction, FillFailure, FillProgress, FillStatus, Filler, WordList, DEFAULT_MIN_WORD_LENGTH,
};

/// Fill a crossword grid from a word list
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the grid template: one row per line, `#` for blocks, `.` for empty cells, letters
    /// for prefilled cells
    template_path: String,

    /// Path to the word list, one `word;score` per line
    #[arg(long)]
    word_list: String,

    /// Shortest word to read from the word list
    #[arg(long, default_value_t = DEFAULT_MIN_WORD_LENGTH)]
    min_length: usize,

    /// Shuffle candidate order before filling; the number of swaps per entry as a fraction of
    /// its candidate count
    #[arg(long)]
    randomize: Option<f64>,

    /// Seed for --randomize
    #[arg(long)]
    seed: Option<u64>,

    /// Give up after this many seconds (also applies with --progress)
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the grid after every search step
    #[arg(long)]
    progress: bool,

    /// Instead of filling, list the candidates for the entry through a cell, given as
    /// `X,Y,DIR` where DIR is `across` or `down`
    #[arg(long, value_parser = parse_fills_query)]
    fills: Option<FillsQuery>,

    /// Instead of filling, list how many candidates support each letter in a cell, given as
    /// `X,Y`
    #[arg(long, value_parser = parse_cell)]
    letters: Option<(usize, usize)>,
}

#[derive(Debug, Clone, Copy)]
struct FillsQuery {
    x: usize,
    y: usize,
    direction: Direction,
}

fn parse_fills_query(raw: &str) -> Result<FillsQuery, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [x, y, direction] = parts[..] else {
        return Err("expected X,Y,DIR".into());
    };
    let x = x.parse().map_err(|_| format!("invalid x coordinate: {x}"))?;
    let y = y.parse().map_err(|_| format!("invalid y coordinate: {y}"))?;
    let direction = match direction.to_lowercase().as_str() {
        "across" | "a" | "0" => Direction::Across,
        "down" | "d" | "1" => Direction::Down,
        _ => return Err(format!("invalid direction: {direction}")),
    };
    Ok(FillsQuery { x, y, direction })
}

fn parse_cell(raw: &str) -> Result<(usize, usize), String> {
    let (x, y) = raw.split_once(',').ok_or("expected X,Y")?;
    let x = x.trim().parse().map_err(|_| format!("invalid x coordinate: {x}"))?;
    let y = y.trim().parse().map_err(|_| format!("invalid y coordinate: {y}"))?;
    Ok((x, y))
}

/// Step through a fill, reporting every step, until it finishes or the timeout passes.
fn fill_with_progress(
    filler: &mut Filler,
    timeout: Option<Duration>,
    mut on_progress: impl FnMut(&FillProgress),
) -> Result<String, FillFailure> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let mut status = FillStatus::Searching;
    for progress in filler.steps(None) {
        on_progress(&progress);
        status = progress.status;
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
    }

    match status {
        FillStatus::Solved => Ok(filler.grid().to_string()),
        FillStatus::Searching => Err(FillFailure::Timeout),
        FillStatus::Unsolvable => Err(FillFailure::Unsolvable),
        FillStatus::Aborted => Err(FillFailure::Abort),
    }
}

fn run(args: &Args) -> Result<(), String> {
    let contents = std::fs::read_to_string(&args.word_list)
        .map_err(|e| format!("Can't read word list {}: {e}", args.word_list))?;
    let word_list = WordList::parse_with_min_length(&contents, args.min_length);
    if word_list.is_empty() {
        return Err("Word list is empty".into());
    }

    let template = std::fs::read_to_string(&args.template_path)
        .map_err(|e| format!("Can't read template {}: {e}", args.template_path))?;
    let mut filler = Filler::new(&template, Arc::new(word_list)).map_err(|e| e.to_string())?;

    if let Some(FillsQuery { x, y, direction }) = args.fills {
        let fills = filler
            .get_fills(x, y, direction)
            .map_err(|e| e.to_string())?;
        for fill in fills {
            println!("{};{}", fill.word, fill.score);
        }
        return Ok(());
    }

    if let Some((x, y)) = args.letters {
        let counts = filler.get_cell_letters(x, y).map_err(|e| e.to_string())?;
        for (letter, count) in counts.ranked() {
            println!("{letter} {count}");
        }
        return Ok(());
    }

    if let Some(amount) = args.randomize {
        filler.randomize(amount, args.seed);
    }

    let timeout = args.timeout.map(Duration::from_secs);
    let result = if args.progress {
        fill_with_progress(&mut filler, timeout, |progress| {
            println!("{}\n", progress.grid);
        })
    } else {
        filler.fill_with_timeout(timeout)
    };

    info!("{:?}", filler.statistics());
    println!("{}", result.map_err(|e| e.to_string())?);
    Ok(())
}

fn main() {
    env_logger::init();

    let args = Args::parse();
    if let Err(error) = run(&args) {
        eprintln!("{error}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_filler() -> Filler {
        let word_list = WordList::parse("arc\nboa\nset\nabs\nroe\ncat\nace\nbet");
        Filler::new("...\n...\n...", Arc::new(word_list)).unwrap()
    }

    #[test]
    fn test_progress_fill_honors_timeout() {
        let mut filler = square_filler();
        let mut steps = 0;
        let result = fill_with_progress(&mut filler, Some(Duration::ZERO), |_| steps += 1);
        assert_eq!(result, Err(FillFailure::Timeout));
        assert_eq!(steps, 1);

        // The search picks up where it stopped.
        let result = fill_with_progress(&mut filler, None, |_| steps += 1);
        assert!(result.is_ok());
        assert!(steps > 1);
    }

    #[test]
    fn test_progress_fill_reports_every_step() {
        let mut filler = square_filler();
        let mut grids = vec![];
        let result = fill_with_progress(&mut filler, None, |progress| {
            grids.push(progress.grid.clone());
        });

        assert_eq!(grids.last(), result.as_ref().ok());
        assert_eq!(grids.len(), filler.statistics().states);
    }

    #[test]
    fn test_parse_fills_query() {
        let query = parse_fills_query("2, 0, down").unwrap();
        assert_eq!((query.x, query.y, query.direction), (2, 0, Direction::Down));
        assert!(parse_fills_query("2,0").is_err());
        assert!(parse_fills_query("2,0,sideways").is_err());
        assert_eq!(parse_cell("1,3"), Ok((1, 3)));
    }
}
