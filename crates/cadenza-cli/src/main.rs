//! Cadenza CLI - Terminal playlist player

mod app;
mod cli;
mod input;
mod ui;

use std::fs::{ self, OpenOptions };
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;

use anyhow::{ Context, Result };
use clap::Parser;
use crossterm::{
    event::{ self, Event, KeyEventKind },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::prelude::*;
use tokio::sync::mpsc::{ self, UnboundedReceiver, UnboundedSender };
use tracing_subscriber::EnvFilter;

use cadenza_core::{ AppPaths, DeviceEngine, PlaybackController, Ticker };

use app::{ App, ScanResult };
use cli::Args;


/// Sends logs to `<cache dir>/cadenza/cadenza.log`; the terminal belongs to
/// the UI. `--verbose` forces debug level, otherwise `RUST_LOG` applies.
fn init_logging( verbose: bool ) -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .context( "No cache directory for the log file" )?
        .join( "cadenza" );
    fs::create_dir_all( &dir )?;

    let path = dir.join( "cadenza.log" );
    let file = OpenOptions::new().create( true ).append( true ).open( &path )?;

    let filter = if verbose {
        EnvFilter::new( "debug" )
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else( |_| EnvFilter::new( "info" ) )
    };

    tracing_subscriber::fmt()
        .with_env_filter( filter )
        .with_ansi( false )
        .with_writer( Mutex::new( file ) )
        .init();

    Ok( path )
}


/// Adds command-line files to the playlist and plays the first of them.
fn add_startup_files( controller: &mut PlaybackController<DeviceEngine>, files: &[PathBuf] ) -> Result<()> {
    let first_new = controller.playlist().len();
    let mut added = 0;

    for file in files {
        let result = if file.is_dir() {
            controller.add_folder( file )
        } else {
            controller.add_files([ file.clone() ])
        };
        added += result.with_context( || format!( "Failed to add {}", file.display() ) )?;
    }

    tracing::info!( "Added {} tracks from the command line", added );
    if added > 0 {
        if let Err( e ) = controller.play_index( first_new ) {
            tracing::warn!( "Could not start playback: {}", e );
        }
    }
    Ok(())
}


/// Forwards terminal events from a blocking reader thread.
fn spawn_input_reader( tx: UnboundedSender<Event> ) {
    thread::spawn( move || loop {
        match event::read() {
            Ok( ev ) => {
                if tx.send( ev ).is_err() {
                    break;
                }
            }
            Err( e ) => {
                tracing::error!( "Terminal input error: {}", e );
                break;
            }
        }
    });
}


async fn event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App<DeviceEngine>,
    scan_rx: &mut UnboundedReceiver<ScanResult>,
) -> Result<()> {
    let ( input_tx, mut input_rx ) = mpsc::unbounded_channel();
    spawn_input_reader( input_tx );

    let mut ticker = Ticker::default();

    loop {
        app.drain_events();
        terminal.draw( |frame| ui::draw( frame, app ) )?;

        if app.should_quit {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => app.on_tick(),
            Some( event ) = input_rx.recv() => {
                if let Event::Key( key ) = event {
                    if key.kind == KeyEventKind::Press {
                        app.handle_key( key.code, key.modifiers );
                    }
                }
            }
            Some( result ) = scan_rx.recv() => app.on_scan_finished( result ),
        }
    }

    Ok(())
}


async fn run( args: Args ) -> Result<()> {
    let paths = args.data_dir.as_deref().map( AppPaths::new ).unwrap_or_default();
    tracing::info!( "Data directory: {:?}", paths.root() );

    let mut controller = PlaybackController::restore( paths, DeviceEngine::new() )
        .context( "Failed to restore settings and playlist" )?;

    if let Some( ref playlist ) = args.playlist {
        controller.open_playlist( playlist )
            .with_context( || format!( "Failed to open playlist {}", playlist.display() ) )?;
    }
    if !args.files.is_empty() {
        add_startup_files( &mut controller, &args.files )?;
    }

    let ( scan_tx, mut scan_rx ) = mpsc::unbounded_channel();
    let mut app = App::new( controller, scan_tx );

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute( EnterAlternateScreen )?;
    let mut terminal = Terminal::new( CrosstermBackend::new( io::stdout() ) )?;

    let result = event_loop( &mut terminal, &mut app, &mut scan_rx ).await;

    // Cleanup
    disable_raw_mode()?;
    io::stdout().execute( LeaveAlternateScreen )?;
    terminal.show_cursor()?;

    app.controller.stop();
    result
}


fn main() -> Result<()> {
    let args = Args::parse();

    match init_logging( args.verbose ) {
        Ok( path ) => tracing::info!( "Cadenza {} starting, logging to {:?}", env!( "CARGO_PKG_VERSION" ), path ),
        Err( e ) => eprintln!( "Logging disabled: {:#}", e ),
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on( run( args ) )
}

