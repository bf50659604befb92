mod config;
mod dispatch;
mod engine;
mod input;
mod lifecycle;
mod tuning;
mod types;
mod ui;
mod voice;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{fs::File, io, panic, path::PathBuf, sync::Mutex, thread, time::Duration};
use tracing::{error, info};

use config::{InputMode, SerpentoneConfig};
use dispatch::{notification_channel, Dispatcher};
use engine::cpal_engine::CpalEngine;
use input::keyboard::{supports_release_events, KeyboardAdapter, KeyboardState};
use input::midi::MidiAdapter;
use input::InputAdapter;
use lifecycle::{Coordinator, LifecycleState, Session};
use ui::{app::App, events, render};
use voice::Notification;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Play polyphonic notes with switchable instruments and tunings
#[derive(Parser, Debug)]
#[command(name = "serpentone")]
#[command(about = "Polyphonic keyboard with switchable instruments and tunings", long_about = None)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// List available devices and exit
    #[arg(short = 'l', long = "list")]
    list_devices: bool,

    /// Play from a MIDI input port (index or name substring, default first port)
    #[arg(long, num_args = 0..=1, default_missing_value = "0", value_name = "PORT")]
    midi: Option<String>,

    /// Play from the computer keyboard
    #[arg(long, conflicts_with = "midi")]
    qwerty: bool,

    /// Audio output device (index or name substring)
    #[arg(long, value_name = "DEVICE")]
    audio: Option<String>,

    /// Write logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

/// The terminal belongs to the UI, so logs only go to a file when asked
fn init_logging(args: &Args) -> Result<()> {
    let Some(path) = &args.log_file else {
        return Ok(());
    };
    let file = File::create(path).with_context(|| format!("Failed to create log file: {}", path.display()))?;
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(level)
        .with_thread_names(true)
        .init();
    Ok(())
}

/// Panics land in the log with the thread they happened on. Only the main
/// thread also prints, since other threads report through the coordinator.
fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let current = thread::current();
        let name = current.name().unwrap_or("unnamed");
        error!(thread = name, "panic: {}", info);
        if name == "main" {
            default_hook(info);
        }
    }));
}

fn list_devices() -> Result<()> {
    let midi_devices = MidiAdapter::list_devices()?;
    let audio_devices = CpalEngine::list_output_devices()?;

    println!("Available MIDI Input Devices:");
    for (i, device) in midi_devices.iter().enumerate() {
        println!("  {}: {}", i, device);
    }
    println!("\nAvailable Audio Output Devices:");
    for (i, device) in audio_devices.iter().enumerate() {
        println!("  {}: {}", i, device);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    install_panic_hook();

    if args.list_devices {
        return list_devices();
    }

    let mut config = match &args.config {
        Some(path) => SerpentoneConfig::load(path)?,
        None => SerpentoneConfig::default(),
    };
    if let Some(port) = args.midi {
        config.input = InputMode::Midi;
        config.devices.midiin = Some(port);
    }
    if args.qwerty {
        config.input = InputMode::Qwerty;
    }
    if args.audio.is_some() {
        config.devices.audioout = args.audio;
    }
    config.validate()?;

    run(config)
}

fn run(config: SerpentoneConfig) -> Result<()> {
    let (dispatcher, inbox) = Dispatcher::new();
    let (notifier, notifications) = notification_channel();
    let mut coordinator = Coordinator::new(dispatcher, inbox, notifier, config.settle());

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config.input, None);
    let result = run_session(&mut terminal, &mut app, &mut coordinator, &notifications, &config);

    // Whatever happened, stop the engine before giving the terminal back
    if coordinator.state() == LifecycleState::Ready {
        if let Err(err) = coordinator.shutdown() {
            error!("shutdown failed: {}", err);
            app.push_status(format!("Shutdown failed: {}", err));
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    for notification in notifications.try_iter() {
        app.apply(notification);
    }
    if result.is_err() {
        for (elapsed, text) in &app.status_log {
            eprintln!("[{:>7.2}s] {}", elapsed.as_secs_f64(), text);
        }
    }
    result
}

fn run_session(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    coordinator: &mut Coordinator,
    notifications: &Receiver<Notification>,
    config: &SerpentoneConfig,
) -> Result<()> {
    terminal.draw(|f| render::render(f, app))?;

    let audio_device = config.devices.audioout.clone();
    let session = Session {
        instruments: config.instruments.clone(),
        initial_instrument: config.instrument.clone(),
        tuning: config.initial_tuning(),
        placement: config.placement,
    };
    coordinator.boot(move || CpalEngine::new(audio_device), session)?;
    app.lifecycle = coordinator.state();

    let (quit_tx, quit_rx) = crossbeam_channel::unbounded();
    let adapter: Box<dyn InputAdapter> = match config.input {
        InputMode::Qwerty => {
            let state = KeyboardState::new(
                config.octave,
                config.velocity,
                config.instrument_names(),
                &config.instrument,
                config.tuning.system,
                config.tuning.key,
            );
            app.octave = Some(state.octave());
            if !supports_release_events() {
                app.push_status("Terminal does not report key releases; press a key again to stop its note");
            }
            Box::new(KeyboardAdapter::new(state, quit_tx))
        }
        InputMode::Midi => {
            let port = config.devices.midiin.clone().unwrap_or_else(|| "0".to_string());
            Box::new(MidiAdapter::new(port))
        }
    };
    coordinator.start_listeners(vec![adapter])?;
    info!(input = ?config.input, "session started");

    loop {
        for notification in notifications.try_iter() {
            app.apply(notification);
        }
        app.lifecycle = coordinator.state();

        terminal.draw(|f| render::render(f, app))?;

        match config.input {
            InputMode::Qwerty => {
                if quit_rx.try_recv().is_ok() {
                    app.quit();
                }
                thread::sleep(FRAME_INTERVAL);
            }
            // No listener owns the terminal, so the UI reads quit keys itself
            InputMode::Midi => events::handle_events(app, FRAME_INTERVAL)?,
        }

        if let Some(fault) = coordinator.poll_fault() {
            error!("{}", fault);
            return Err(fault.into());
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
