mod audio;
mod audio_api;
mod error;
mod middle;
mod notes;
mod pipeline;
mod shared;
mod tui;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{ArgAction, Parser};
use crossterm::terminal;
use log::info;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use middle::Middle;
use pipeline::{bounce, persistence};
use shared::Command;

/// Terminal step sequencer.
#[derive(Parser, Debug, PartialEq)]
#[command(name = "rowseq", version, about, long_about = None)]
struct Args {
    /// Project directory; the project lives in .rowseq/project.json inside it
    project_dir: Option<PathBuf>,

    /// Render the project to a WAV file instead of opening the sequencer
    #[arg(long, value_name = "OUT.wav")]
    bounce: Option<PathBuf>,

    /// Number of passes over the pattern when bouncing
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    loops: u32,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    // the tui owns the terminal, so it only hears about warnings unless asked
    let quiet = if args.bounce.is_some() { log::Level::Info } else { log::Level::Warn };
    let level = match args.verbose {
        0 => quiet,
        1 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    simple_logger::init_with_level(level)?;

    let project_dir = match args.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("no project directory")?,
    };
    let doc = persistence::load_project(&project_dir)?.unwrap_or_default();

    if let Some(out) = &args.bounce {
        let summary = bounce::bounce(&doc, out, args.loops)?;
        info!("{} rows, {} frames", summary.rows, summary.frames);
        return Ok(());
    }

    let audio = audio::start_audio()?;
    let mut middle = Middle::new(Box::new(audio));
    middle.set_project_dir(&project_dir);
    middle.load_document(doc)?;

    terminal::enable_raw_mode()?;
    let _guard = RawModeGuard; // auto drops when out of scope
    crossterm::execute!(std::io::stdout(), terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(std::io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let tick_rate = Duration::from_millis(16); // ~60fps
    let mut last_tick = Instant::now();
    let mut tui_state = tui::mode::TuiState::default();

    loop {
        let ds = middle.display_state();
        tui_state.sync(&ds);

        term.draw(|frame| {
            tui::view::render(frame, frame.area(), &ds, &tui_state);
        })?;

        for cmd in tui::input::poll_input(tick_rate, &mut tui_state)? {
            if cmd == Command::Quit {
                // save before quitting
                middle.save();
                info!("quit: {}", middle.status());
                return Ok(());
            }
            // errors are already logged and in the status line
            let _ = middle.handle_input(cmd);
        }

        let elapsed = last_tick.elapsed();
        last_tick = Instant::now();
        middle.tick(elapsed);
    }
}

struct RawModeGuard;
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(std::io::stdout(), terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}
