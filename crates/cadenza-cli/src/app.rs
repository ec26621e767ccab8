//! Application state and input handling for the TUI.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{ Duration, Instant };

use crossterm::event::{ KeyCode, KeyModifiers };
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;

use cadenza_core::{
    library::{ self, LibraryError },
    AudioEngine, Command, PlaybackController, PlaybackState, PlayerError, PlayerEvent, TickOutcome,
};

use crate::input::{ InputBuffer, InputMode };


/// Volume change per key press.
const VOLUME_STEP: u8 = 5;

/// Seek distance per key press.
const SEEK_STEP: Duration = Duration::from_secs( 5 );

/// How long status messages stay visible.
const STATUS_TIMEOUT: Duration = Duration::from_secs( 3 );


/// Result of a background folder scan.
pub type ScanResult = ( PathBuf, Result<Vec<PathBuf>, LibraryError> );


/// What a key press in normal mode asks for.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Action {
    Quit,
    ToggleHelp,
    CloseOverlay,
    EnterCommand,
    SelectPrevious,
    SelectNext,
    PlaySelected,
    TogglePlay,
    Stop,
    Next,
    Prev,
    RemoveSelected,
    VolumeUp,
    VolumeDown,
    SeekBackward,
    SeekForward,
}


/// Maps a normal-mode key to its action.
pub fn key_action( code: KeyCode, modifiers: KeyModifiers ) -> Option<Action> {
    if modifiers.contains( KeyModifiers::CONTROL ) {
        return match code {
            KeyCode::Char( 'c' ) => Some( Action::Quit ),
            _ => None,
        };
    }

    let action = match code {
        KeyCode::Char( 'q' ) => Action::Quit,
        KeyCode::Char( '?' ) => Action::ToggleHelp,
        KeyCode::Esc => Action::CloseOverlay,
        KeyCode::Char( '/' ) => Action::EnterCommand,
        KeyCode::Up | KeyCode::Char( 'k' ) => Action::SelectPrevious,
        KeyCode::Down | KeyCode::Char( 'j' ) => Action::SelectNext,
        KeyCode::Enter => Action::PlaySelected,
        KeyCode::Char( ' ' ) => Action::TogglePlay,
        KeyCode::Char( 's' ) => Action::Stop,
        KeyCode::Char( 'n' ) => Action::Next,
        KeyCode::Char( 'p' ) => Action::Prev,
        KeyCode::Char( 'x' ) | KeyCode::Delete => Action::RemoveSelected,
        KeyCode::Char( '+' ) | KeyCode::Char( '=' ) => Action::VolumeUp,
        KeyCode::Char( '-' ) => Action::VolumeDown,
        KeyCode::Left => Action::SeekBackward,
        KeyCode::Right => Action::SeekForward,
        _ => return None,
    };
    Some( action )
}


/// Application state.
pub struct App<E: AudioEngine> {
    pub controller: PlaybackController<E>,
    events: mpsc::Receiver<PlayerEvent>,
    scan_tx: UnboundedSender<ScanResult>,
    pub should_quit: bool,

    // View state
    pub playlist_state: ListState,
    pub show_help: bool,

    // Input state
    pub input_mode: InputMode,
    pub input_buffer: InputBuffer,

    // Last published position
    pub position_ms: u64,
    pub duration_ms: Option<u64>,

    pub status_message: Option<String>,
    status_clear_at: Option<Instant>,
}


impl<E: AudioEngine> App<E> {
    pub fn new( mut controller: PlaybackController<E>, scan_tx: UnboundedSender<ScanResult> ) -> Self {
        let events = controller.subscribe();

        let mut playlist_state = ListState::default();
        if !controller.playlist().is_empty() {
            playlist_state.select( Some( controller.playlist().current_track_index() ) );
        }

        Self {
            controller,
            events,
            scan_tx,
            should_quit: false,
            playlist_state,
            show_help: false,
            input_mode: InputMode::Normal,
            input_buffer: InputBuffer::new(),
            position_ms: 0,
            duration_ms: None,
            status_message: None,
            status_clear_at: None,
        }
    }


    /// Sets a status message that auto-clears after a delay.
    pub fn set_status( &mut self, msg: impl Into<String> ) {
        self.status_message = Some( msg.into() );
        self.status_clear_at = Some( Instant::now() + STATUS_TIMEOUT );
    }


    /// Shows a failed operation in the status bar.
    fn report<T>( &mut self, result: Result<T, PlayerError> ) -> Option<T> {
        match result {
            Ok( value ) => Some( value ),
            Err( e ) => {
                tracing::warn!( "{}", e );
                self.set_status( e.to_string() );
                None
            }
        }
    }


    /// Applies controller events to the view state.
    pub fn drain_events( &mut self ) {
        while let Ok( event ) = self.events.try_recv() {
            match event {
                PlayerEvent::PositionChanged { position_ms, duration_ms } => {
                    self.position_ms = position_ms;
                    self.duration_ms = duration_ms;
                }
                PlayerEvent::StateChanged { state: PlaybackState::Stopped } => {
                    self.position_ms = 0;
                }
                PlayerEvent::StateChanged { .. } | PlayerEvent::MetadataChanged { .. } => {}
                PlayerEvent::CurrentIndexChanged { index } => {
                    self.position_ms = 0;
                    self.duration_ms = self.controller.duration_ms();
                    self.playlist_state.select( Some( index ) );
                }
                PlayerEvent::TracksChanged { len } => {
                    let selected = match self.playlist_state.selected() {
                        _ if len == 0 => None,
                        Some( i ) => Some( i.min( len - 1 ) ),
                        None => Some( 0 ),
                    };
                    self.playlist_state.select( selected );
                }
                PlayerEvent::PlaylistChanged { name, len, .. } => {
                    self.playlist_state = ListState::default();
                    if len > 0 {
                        self.playlist_state.select( Some( 0 ) );
                    }
                    self.set_status( format!( "Playlist: {} ({} tracks)", name, len ) );
                }
                PlayerEvent::VolumeChanged { volume } => {
                    self.set_status( format!( "Volume: {}%", volume ) );
                }
                PlayerEvent::Error { message } => {
                    self.set_status( message );
                }
            }
        }
    }


    /// Runs once per ticker period.
    pub fn on_tick( &mut self ) {
        if let Some( clear_at ) = self.status_clear_at {
            if Instant::now() >= clear_at {
                self.status_message = None;
                self.status_clear_at = None;
            }
        }

        let outcome = self.controller.tick();
        if let Some( TickOutcome::AdvanceFailed ) = self.report( outcome ) {
            self.set_status( "No playable track left" );
        }
    }


    /// Adds the tracks found by a background folder scan.
    pub fn on_scan_finished( &mut self, result: ScanResult ) {
        let ( dir, found ) = result;
        match found {
            Ok( tracks ) => {
                let added = self.controller.add_files( tracks );
                if let Some( n ) = self.report( added ) {
                    self.set_status( format!( "Added {} tracks from {}", n, dir.display() ) );
                }
            }
            Err( e ) => {
                tracing::warn!( "Scan of {:?} failed: {}", dir, e );
                self.set_status( format!( "Cannot scan {}: {}", dir.display(), e ) );
            }
        }
    }


    /// Handles a key press.
    pub fn handle_key( &mut self, code: KeyCode, modifiers: KeyModifiers ) {
        match self.input_mode {
            InputMode::Normal => {
                if let Some( action ) = key_action( code, modifiers ) {
                    self.perform( action );
                }
            }
            InputMode::Command => self.handle_command_key( code ),
        }
    }


    fn handle_command_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                let line = self.input_buffer.take();
                if line.trim().is_empty() {
                    return;
                }
                match Command::parse( &line ) {
                    Ok( cmd ) => self.execute( cmd ),
                    Err( e ) => self.set_status( e.to_string() ),
                }
            }
            KeyCode::Backspace => self.input_buffer.backspace(),
            KeyCode::Delete => self.input_buffer.delete(),
            KeyCode::Left => self.input_buffer.move_left(),
            KeyCode::Right => self.input_buffer.move_right(),
            KeyCode::Home => self.input_buffer.move_home(),
            KeyCode::End => self.input_buffer.move_end(),
            KeyCode::Char( c ) => self.input_buffer.insert( c ),
            _ => {}
        }
    }


    fn perform( &mut self, action: Action ) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::ToggleHelp => self.show_help = !self.show_help,
            Action::CloseOverlay => self.show_help = false,
            Action::EnterCommand => {
                self.input_mode = InputMode::Command;
                self.input_buffer.clear();
            }
            Action::SelectPrevious => self.move_selection( -1 ),
            Action::SelectNext => self.move_selection( 1 ),
            Action::PlaySelected => {
                if let Some( index ) = self.playlist_state.selected() {
                    let result = self.controller.play_index( index );
                    self.report( result );
                }
            }
            Action::TogglePlay => {
                if self.controller.state() == PlaybackState::Stopped {
                    let result = self.controller.play();
                    self.report( result );
                } else {
                    self.controller.pause();
                }
            }
            Action::Stop => self.controller.stop(),
            Action::Next => {
                let result = self.controller.next();
                self.report( result );
            }
            Action::Prev => {
                let result = self.controller.prev();
                self.report( result );
            }
            Action::RemoveSelected => self.remove_selected(),
            Action::VolumeUp => {
                let volume = self.controller.volume().saturating_add( VOLUME_STEP );
                self.controller.set_volume( volume );
            }
            Action::VolumeDown => {
                let volume = self.controller.volume().saturating_sub( VOLUME_STEP );
                self.controller.set_volume( volume );
            }
            Action::SeekBackward => {
                let target = self.position_ms.saturating_sub( SEEK_STEP.as_millis() as u64 );
                self.seek_to( target );
            }
            Action::SeekForward => {
                let mut target = self.position_ms + SEEK_STEP.as_millis() as u64;
                if let Some( duration ) = self.duration_ms {
                    target = target.min( duration );
                }
                self.seek_to( target );
            }
        }
    }


    fn move_selection( &mut self, delta: isize ) {
        let len = self.controller.playlist().len();
        if len == 0 {
            return;
        }
        let current = self.playlist_state.selected().unwrap_or( 0 ) as isize;
        let next = ( current + delta ).clamp( 0, len as isize - 1 );
        self.playlist_state.select( Some( next as usize ) );
    }


    fn remove_selected( &mut self ) {
        let Some( index ) = self.playlist_state.selected() else {
            return;
        };
        let result = self.controller.remove_track( index );
        if let Some( path ) = self.report( result ) {
            self.set_status( format!( "Removed {}", path.display() ) );
        }
    }


    fn seek_to( &mut self, position_ms: u64 ) {
        let result = self.controller.seek( position_ms );
        if self.report( result ).is_some() {
            self.position_ms = position_ms;
        }
    }


    /// Executes a parsed slash command.
    pub fn execute( &mut self, cmd: Command ) {
        tracing::debug!( "Command: {:?}", cmd );

        match cmd {
            Command::Add { path } => self.add_path( path ),
            Command::New { name } => {
                let result = self.controller.create_playlist( &name );
                self.report( result );
            }
            Command::Open { path } => {
                let result = self.controller.open_playlist( &path );
                self.report( result );
            }
            Command::Remove => self.remove_selected(),
            Command::Play { index: None } => {
                let result = self.controller.play();
                self.report( result );
            }
            Command::Play { index: Some( index ) } => {
                let result = self.controller.play_index( index );
                self.report( result );
            }
            Command::Pause => self.controller.pause(),
            Command::Stop => self.controller.stop(),
            Command::Next => {
                let result = self.controller.next();
                self.report( result );
            }
            Command::Prev => {
                let result = self.controller.prev();
                self.report( result );
            }
            Command::Seek { position } => self.seek_to( position.as_millis() as u64 ),
            Command::Volume { level: Some( level ) } => self.controller.set_volume( level ),
            Command::Volume { level: None } => {
                let volume = self.controller.volume();
                self.set_status( format!( "Volume: {}%", volume ) );
            }
            Command::Help => self.show_help = true,
            Command::Quit => self.should_quit = true,
        }
    }


    /// Adds a file directly, or scans a folder in the background.
    fn add_path( &mut self, path: PathBuf ) {
        if path.is_dir() {
            self.set_status( format!( "Scanning {}...", path.display() ) );
            let tx = self.scan_tx.clone();
            tokio::task::spawn_blocking( move || {
                let found = library::scan_folder( &path );
                let _ = tx.send(( path, found ));
            });
            return;
        }

        let result = self.controller.add_files([ path.clone() ]);
        match self.report( result ) {
            Some( 0 ) => self.set_status( format!( "Not a supported audio file: {}", path.display() ) ),
            Some( _ ) => self.set_status( format!( "Added {}", path.display() ) ),
            None => {}
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::path::Path;

    use cadenza_core::{ AppPaths, EngineError };
    use tempfile::{ tempdir, TempDir };


    /// Engine that accepts every file and reports a fixed position.
    #[derive( Debug, Default )]
    struct StubEngine {
        loaded: bool,
        playing: bool,
    }


    impl AudioEngine for StubEngine {
        fn load( &mut self, _path: &Path ) -> Result<(), EngineError> {
            self.loaded = true;
            Ok(())
        }

        fn play( &mut self ) -> Result<(), EngineError> {
            if !self.loaded {
                return Err( EngineError::NotLoaded );
            }
            self.playing = true;
            Ok(())
        }

        fn pause( &mut self ) {}

        fn unpause( &mut self ) {}

        fn stop( &mut self ) {
            self.loaded = false;
            self.playing = false;
        }

        fn set_volume( &mut self, _volume: f32 ) {}

        fn seek( &mut self, _position_ms: u64 ) -> Result<(), EngineError> {
            Ok(())
        }

        fn current_position( &self ) -> u64 {
            42_000
        }

        fn duration( &self ) -> Option<u64> {
            self.loaded.then_some( 180_000 )
        }

        fn is_stream_active( &self ) -> bool {
            self.playing
        }
    }


    fn app_with( names: &[&str] ) -> ( TempDir, App<StubEngine> ) {
        let dir = tempdir().unwrap();
        let mut controller = PlaybackController::restore( AppPaths::new( dir.path() ), StubEngine::default() ).unwrap();
        controller.add_files( names.iter().copied() ).unwrap();
        let ( scan_tx, _scan_rx ) = tokio::sync::mpsc::unbounded_channel();
        ( dir, App::new( controller, scan_tx ) )
    }


    #[test]
    fn test_removing_last_row_moves_selection_up() {
        let ( _dir, mut app ) = app_with( &[ "a.mp3", "b.mp3", "c.mp3" ] );
        app.playlist_state.select( Some( 2 ) );

        app.perform( Action::RemoveSelected );
        app.drain_events();

        assert_eq!( app.controller.playlist().len(), 2 );
        assert_eq!( app.playlist_state.selected(), Some( 1 ) );
        assert_eq!( app.status_message.as_deref(), Some( "Removed c.mp3" ) );
    }


    #[test]
    fn test_play_command_selects_the_track() {
        let ( _dir, mut app ) = app_with( &[ "a.mp3", "b.mp3" ] );

        app.execute( Command::Play { index: Some( 1 ) } );
        app.drain_events();

        assert_eq!( app.controller.state(), PlaybackState::Playing );
        assert_eq!( app.playlist_state.selected(), Some( 1 ) );
        assert_eq!( app.duration_ms, Some( 180_000 ) );
    }


    #[test]
    fn test_tick_position_and_stop_reset() {
        let ( _dir, mut app ) = app_with( &[ "a.mp3" ] );
        app.execute( Command::Play { index: None } );

        app.on_tick();
        app.drain_events();
        assert_eq!( app.position_ms, 42_000 );

        app.perform( Action::Stop );
        app.drain_events();
        assert_eq!( app.position_ms, 0 );
    }


    #[test]
    fn test_volume_command_reports_level() {
        let ( _dir, mut app ) = app_with( &[] );

        app.execute( Command::Volume { level: Some( 40 ) } );
        app.drain_events();

        assert_eq!( app.controller.volume(), 40 );
        assert_eq!( app.status_message.as_deref(), Some( "Volume: 40%" ) );
    }


    #[test]
    fn test_seek_without_track_shows_error() {
        let ( _dir, mut app ) = app_with( &[ "a.mp3" ] );

        app.execute( Command::Seek { position: Duration::from_secs( 30 ) } );

        assert_eq!( app.position_ms, 0 );
        assert!( app.status_message.is_some() );
    }


    #[test]
    fn test_new_playlist_clears_selection() {
        let ( _dir, mut app ) = app_with( &[ "a.mp3" ] );
        assert_eq!( app.playlist_state.selected(), Some( 0 ) );

        app.execute( Command::New { name: "party".into() } );
        app.drain_events();

        assert_eq!( app.controller.playlist().name(), "party" );
        assert_eq!( app.playlist_state.selected(), None );
        assert_eq!( app.status_message.as_deref(), Some( "Playlist: party (0 tracks)" ) );
    }


    #[test]
    fn test_playback_keys() {
        let none = KeyModifiers::NONE;
        assert_eq!( key_action( KeyCode::Char( ' ' ), none ), Some( Action::TogglePlay ) );
        assert_eq!( key_action( KeyCode::Enter, none ), Some( Action::PlaySelected ) );
        assert_eq!( key_action( KeyCode::Char( 's' ), none ), Some( Action::Stop ) );
        assert_eq!( key_action( KeyCode::Char( 'n' ), none ), Some( Action::Next ) );
        assert_eq!( key_action( KeyCode::Char( 'p' ), none ), Some( Action::Prev ) );
        assert_eq!( key_action( KeyCode::Right, none ), Some( Action::SeekForward ) );
    }


    #[test]
    fn test_ctrl_c_quits_and_other_chords_are_ignored() {
        assert_eq!( key_action( KeyCode::Char( 'c' ), KeyModifiers::CONTROL ), Some( Action::Quit ) );
        assert_eq!( key_action( KeyCode::Char( 'n' ), KeyModifiers::CONTROL ), None );
    }


    #[test]
    fn test_unbound_key() {
        assert_eq!( key_action( KeyCode::Char( 'z' ), KeyModifiers::NONE ), None );
        assert_eq!( key_action( KeyCode::F( 5 ), KeyModifiers::NONE ), None );
    }
}
