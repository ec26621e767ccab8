//! Playback controller
//!
//! [`PlaybackController`] owns the active playlist, the settings store and an
//! [`AudioEngine`], and implements the play/pause/stop/next/prev state
//! machine on top of them. Presentation layers observe it through
//! [`PlayerEvent`]s and call its operations from a single thread.

use std::path::{ Path, PathBuf };
use std::sync::mpsc;

use thiserror::Error;

use crate::engine::{ AudioEngine, EngineError };
use crate::library::{ self, LibraryError };
use crate::paths::AppPaths;
use crate::playlist::{ Playlist, PlaylistError };
use crate::settings::{ SettingsError, SettingsStore };
use crate::track::Track;


/// Errors that can occur during playback control.
#[derive( Debug, Error )]
pub enum PlayerError {
    #[error( transparent )]
    Settings( #[from] SettingsError ),

    #[error( transparent )]
    Playlist( #[from] PlaylistError ),

    #[error( transparent )]
    Library( #[from] LibraryError ),

    #[error( "Failed to load {path}: {source}" )]
    EngineLoad {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error( "Audio engine error: {0}" )]
    Engine( #[from] EngineError ),

    #[error( "No track loaded" )]
    NoTrack,

    #[error( "Track index {index} out of range (playlist has {len} tracks)" )]
    IndexOutOfRange { index: usize, len: usize },
}


/// Current playback state.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}


/// Events emitted by the controller for presentation updates.
#[derive( Debug, Clone, PartialEq )]
pub enum PlayerEvent {
    /// A different playlist became active.
    PlaylistChanged { name: String, path: PathBuf, len: usize },
    /// Tracks were added to or removed from the active playlist.
    TracksChanged { len: usize },
    StateChanged { state: PlaybackState },
    CurrentIndexChanged { index: usize },
    MetadataChanged { track: Track },
    PositionChanged { position_ms: u64, duration_ms: Option<u64> },
    VolumeChanged { volume: u8 },
    Error { message: String },
}


/// What a ticker reconciliation did.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum TickOutcome {
    /// Not playing; nothing to reconcile.
    Idle,
    /// Position was published.
    Position { position_ms: u64 },
    /// A seek was applied since the last tick; position not published.
    Suppressed,
    /// The stream ended and playback moved on to `index`.
    Advanced { index: usize },
    /// The stream ended and no following track could be loaded.
    AdvanceFailed,
}


#[derive( Debug, Clone, Copy, PartialEq, Eq )]
enum Direction {
    Forward,
    Backward,
}


/// Steps `index` one place around a playlist of `len` tracks.
fn wrap_step( index: usize, len: usize, direction: Direction ) -> usize {
    match direction {
        Direction::Forward => ( index + 1 ) % len,
        Direction::Backward => ( index + len - 1 ) % len,
    }
}


/// Playlist and playback state machine.
pub struct PlaybackController<E: AudioEngine> {
    paths: AppPaths,
    settings: SettingsStore,
    playlist: Playlist,
    engine: E,
    state: PlaybackState,
    /// Cached track under the playlist cursor
    current: Option<( usize, Track )>,
    /// Whether the engine holds the cached track
    loaded: bool,
    /// Volume level, 0 to 100
    volume: u8,
    /// Suppresses the next position update after a seek
    seek_pending: bool,
    listeners: Vec<mpsc::Sender<PlayerEvent>>,
}


impl<E: AudioEngine> PlaybackController<E> {
    /// Creates a controller over already-opened state.
    pub fn new( paths: AppPaths, settings: SettingsStore, playlist: Playlist, mut engine: E ) -> Self {
        engine.set_volume( 1.0 );

        let mut controller = Self {
            paths,
            settings,
            playlist,
            engine,
            state: PlaybackState::Stopped,
            current: None,
            loaded: false,
            volume: 100,
            seek_pending: false,
            listeners: Vec::new(),
        };
        controller.refresh_current();
        controller
    }


    /// Rebuilds the controller from the files under `paths`.
    ///
    /// A corrupt settings file is fatal. A corrupt opened playlist falls back
    /// to the default playlist.
    pub fn restore( paths: AppPaths, engine: E ) -> Result<Self, PlayerError> {
        let mut settings = SettingsStore::load( &paths )?;
        let opened = settings.settings().opened_playlist.clone();
        let default = settings.settings().default_playlist.clone();

        let playlist = match Playlist::open_or_create( &opened ) {
            Ok( p ) => p,
            Err( e @ PlaylistError::Corrupt { .. } ) if opened != default => {
                tracing::warn!( "{}; opening default playlist instead", e );
                Playlist::open_or_create( &default )?
            }
            Err( e ) => return Err( e.into() ),
        };

        if playlist.path() != opened {
            settings.set_opened_playlist( playlist.path() )?;
        }
        if settings.settings().current_track != playlist.current_track_index() {
            settings.set_current_track( playlist.current_track_index() )?;
        }

        tracing::info!(
            "Restored playlist {:?} ({} tracks), track {}",
            playlist.name(),
            playlist.len(),
            playlist.current_track_index()
        );

        Ok( Self::new( paths, settings, playlist, engine ) )
    }


    /// Registers a listener. Dropped receivers are pruned on the next event.
    pub fn subscribe( &mut self ) -> mpsc::Receiver<PlayerEvent> {
        let ( tx, rx ) = mpsc::channel();
        self.listeners.push( tx );
        rx
    }


    fn emit( &mut self, event: PlayerEvent ) {
        self.listeners.retain( |tx| tx.send( event.clone() ).is_ok() );
    }


    fn set_state( &mut self, state: PlaybackState ) {
        if self.state != state {
            tracing::info!( "Playback state: {:?} -> {:?}", self.state, state );
            self.state = state;
            self.emit( PlayerEvent::StateChanged { state } );
        }
    }


    /// Brings the cached track in line with the playlist cursor.
    fn refresh_current( &mut self ) {
        let index = self.playlist.current_track_index();
        let path = match self.playlist.get( index ) {
            Some( p ) => p.clone(),
            None => {
                self.current = None;
                self.loaded = false;
                return;
            }
        };

        let same_track = self.current.as_ref().map_or( false, |( _, t )| t.path == path );
        if same_track {
            let moved = self.current.as_ref().map_or( false, |( i, _ )| *i != index );
            if moved {
                if let Some(( ref mut cached, _ )) = self.current {
                    *cached = index;
                }
                self.emit( PlayerEvent::CurrentIndexChanged { index } );
            }
            return;
        }

        let track = Track::from_path( &path );
        self.current = Some(( index, track.clone() ));
        self.loaded = false;
        self.emit( PlayerEvent::CurrentIndexChanged { index } );
        self.emit( PlayerEvent::MetadataChanged { track } );
    }


    /// Moves the playlist cursor and records it in the settings.
    fn set_cursor( &mut self, index: usize ) -> Result<(), PlayerError> {
        self.playlist.set_current_track_index( index )?;
        self.settings.set_current_track( self.playlist.current_track_index() )?;
        self.refresh_current();
        Ok(())
    }


    fn cached_index( &self ) -> Option<usize> {
        self.current.as_ref().map( |( i, _ )| *i )
    }


    /// Moves to `index`, loads it and starts playback.
    ///
    /// On a load failure the controller ends up stopped with the cursor one
    /// step further in `direction`.
    fn start_track( &mut self, index: usize, direction: Direction ) -> Result<(), PlayerError> {
        // Another entry may hold the same file; it still starts from the top
        if self.cached_index() != Some( index ) {
            self.loaded = false;
        }
        self.set_cursor( index )?;
        let path = match self.playlist.current_track() {
            Some( p ) => p.clone(),
            None => return Ok(()),
        };

        let result = if self.loaded {
            self.engine.play()
        } else {
            self.engine.load( &path ).and_then( |_| self.engine.play() )
        };

        match result {
            Ok(()) => {
                self.loaded = true;
                self.seek_pending = false;
                self.set_state( PlaybackState::Playing );
                Ok(())
            }
            Err( source ) => {
                tracing::error!( "Failed to play {:?}: {}", path, source );
                self.engine.stop();
                self.loaded = false;
                self.set_state( PlaybackState::Stopped );
                self.emit( PlayerEvent::Error { message: format!( "Cannot play {}: {}", path.display(), source ) } );

                let len = self.playlist.len();
                let skip_to = wrap_step( self.playlist.current_track_index(), len, direction );
                self.set_cursor( skip_to )?;

                Err( PlayerError::EngineLoad { path, source } )
            }
        }
    }


    /// Starts or resumes playback.
    ///
    /// From Stopped the track under the cursor is loaded and started; from
    /// Paused the engine resumes; while Playing nothing happens.
    pub fn play( &mut self ) -> Result<(), PlayerError> {
        match self.state {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                self.engine.unpause();
                self.set_state( PlaybackState::Playing );
                Ok(())
            }
            PlaybackState::Stopped => {
                if self.playlist.is_empty() {
                    tracing::debug!( "Play requested on an empty playlist" );
                    return Ok(());
                }
                let index = self.playlist.current_track_index();
                self.start_track( index, Direction::Forward )
            }
        }
    }


    /// Pauses playback, or resumes it when already paused.
    pub fn pause( &mut self ) {
        match self.state {
            PlaybackState::Playing => {
                self.engine.pause();
                self.set_state( PlaybackState::Paused );
            }
            PlaybackState::Paused => {
                self.engine.unpause();
                self.set_state( PlaybackState::Playing );
            }
            PlaybackState::Stopped => {}
        }
    }


    /// Stops playback and unloads the engine.
    pub fn stop( &mut self ) {
        self.engine.stop();
        self.loaded = false;
        self.seek_pending = false;
        self.set_state( PlaybackState::Stopped );
    }


    /// Plays the next track, wrapping to the first after the last.
    pub fn next( &mut self ) -> Result<(), PlayerError> {
        self.step( Direction::Forward )
    }


    /// Plays the previous track, wrapping to the last before the first.
    pub fn prev( &mut self ) -> Result<(), PlayerError> {
        self.step( Direction::Backward )
    }


    fn step( &mut self, direction: Direction ) -> Result<(), PlayerError> {
        let len = self.playlist.len();
        if len == 0 {
            return Ok(());
        }
        let index = wrap_step( self.playlist.current_track_index(), len, direction );
        // A one-track playlist wraps onto itself and restarts
        self.loaded = false;
        self.start_track( index, direction )
    }


    /// Makes the track at `index` current.
    ///
    /// Nothing is reloaded when `index` is already current. Otherwise the
    /// new track replaces the playing one, or is loaded ready to play when
    /// playback is paused or stopped. An empty playlist yields no track and
    /// stops playback.
    pub fn select_track( &mut self, index: usize ) -> Result<Option<&Track>, PlayerError> {
        let len = self.playlist.len();
        if len == 0 {
            self.stop();
            return Ok( None );
        }
        if index >= len {
            return Err( PlayerError::IndexOutOfRange { index, len } );
        }

        if self.cached_index() != Some( index ) {
            if self.state == PlaybackState::Playing {
                self.start_track( index, Direction::Forward )?;
            } else {
                self.engine.stop();
                self.loaded = false;
                self.set_state( PlaybackState::Stopped );
                self.set_cursor( index )?;

                let path = self.playlist.tracks()[ index ].clone();
                if let Err( source ) = self.engine.load( &path ) {
                    tracing::error!( "Failed to load {:?}: {}", path, source );
                    self.emit( PlayerEvent::Error { message: format!( "Cannot load {}: {}", path.display(), source ) } );
                    return Err( PlayerError::EngineLoad { path, source } );
                }
                self.loaded = true;
            }
        }

        Ok( self.current_track() )
    }


    /// Selects the track at `index` and plays it from the start.
    pub fn play_index( &mut self, index: usize ) -> Result<(), PlayerError> {
        let len = self.playlist.len();
        if index >= len {
            return Err( PlayerError::IndexOutOfRange { index, len } );
        }

        self.stop();
        self.start_track( index, Direction::Forward )
    }


    /// Moves the playhead of the loaded track.
    pub fn seek( &mut self, position_ms: u64 ) -> Result<(), PlayerError> {
        if !self.loaded || self.state == PlaybackState::Stopped {
            return Err( PlayerError::NoTrack );
        }

        self.engine.seek( position_ms )?;
        self.seek_pending = true;
        let duration_ms = self.engine.duration();
        self.emit( PlayerEvent::PositionChanged { position_ms, duration_ms } );
        Ok(())
    }


    /// Sets the volume, 0 to 100. Larger values are clamped.
    pub fn set_volume( &mut self, volume: u8 ) {
        let volume = volume.min( 100 );
        self.volume = volume;
        self.engine.set_volume( volume as f32 / 100.0 );
        self.emit( PlayerEvent::VolumeChanged { volume } );
    }


    /// Reconciles engine position with the model. Called once per tick.
    pub fn tick( &mut self ) -> Result<TickOutcome, PlayerError> {
        if self.state != PlaybackState::Playing {
            return Ok( TickOutcome::Idle );
        }

        if !self.engine.is_stream_active() {
            tracing::debug!( "End of stream" );
            return self.advance_after_end();
        }

        if self.seek_pending {
            self.seek_pending = false;
            return Ok( TickOutcome::Suppressed );
        }

        let position_ms = self.engine.current_position();
        let duration_ms = self.engine.duration();
        self.emit( PlayerEvent::PositionChanged { position_ms, duration_ms } );
        Ok( TickOutcome::Position { position_ms } )
    }


    /// Moves on after the stream ended, skipping tracks that fail to load.
    /// Gives up after one lap of the playlist.
    fn advance_after_end( &mut self ) -> Result<TickOutcome, PlayerError> {
        let len = self.playlist.len();
        if len == 0 {
            self.stop();
            return Ok( TickOutcome::Idle );
        }

        let mut index = self.playlist.current_track_index();
        for _ in 0..len {
            index = wrap_step( index, len, Direction::Forward );
            self.loaded = false;
            match self.start_track( index, Direction::Forward ) {
                Ok(()) => return Ok( TickOutcome::Advanced { index } ),
                Err( PlayerError::EngineLoad { .. } ) => continue,
                Err( e ) => return Err( e ),
            }
        }

        tracing::warn!( "No playable track left in {:?}", self.playlist.name() );
        Ok( TickOutcome::AdvanceFailed )
    }


    /// Appends supported files to the playlist. Returns how many were added.
    pub fn add_files<I, P>( &mut self, paths: I ) -> Result<usize, PlayerError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let added = self.playlist.add_tracks( paths )?;
        if added > 0 {
            tracing::info!( "Added {} tracks to {:?}", added, self.playlist.name() );
            let len = self.playlist.len();
            self.emit( PlayerEvent::TracksChanged { len } );
            if self.current.is_none() {
                let index = self.playlist.current_track_index();
                self.set_cursor( index )?;
            }
        }
        Ok( added )
    }


    /// Recursively adds the supported files below `dir`.
    pub fn add_folder( &mut self, dir: &Path ) -> Result<usize, PlayerError> {
        let found = library::scan_folder( dir )?;
        self.add_files( found )
    }


    /// Opens or creates the playlist called `name` and makes it active.
    pub fn create_playlist( &mut self, name: &str ) -> Result<(), PlayerError> {
        let playlist = Playlist::open_or_create_named( &self.paths.playlists_dir(), name )?;
        self.replace_playlist( playlist )
    }


    /// Opens the playlist file at `path` (creating it if missing) and makes
    /// it active.
    pub fn open_playlist( &mut self, path: &Path ) -> Result<(), PlayerError> {
        let playlist = Playlist::open_or_create( path )?;
        self.replace_playlist( playlist )
    }


    fn replace_playlist( &mut self, playlist: Playlist ) -> Result<(), PlayerError> {
        self.stop();
        self.playlist = playlist;
        self.current = None;

        self.settings.set_opened_playlist( self.playlist.path() )?;
        self.settings.set_current_track( self.playlist.current_track_index() )?;

        tracing::info!( "Opened playlist {:?} ({} tracks)", self.playlist.name(), self.playlist.len() );
        self.emit( PlayerEvent::PlaylistChanged {
            name: self.playlist.name().to_string(),
            path: self.playlist.path().to_path_buf(),
            len: self.playlist.len(),
        });
        self.refresh_current();
        Ok(())
    }


    /// Removes the track at `index`. Removing the loaded track stops playback.
    pub fn remove_track( &mut self, index: usize ) -> Result<PathBuf, PlayerError> {
        let removes_current = index == self.playlist.current_track_index();
        let removed = self.playlist.remove_track( index )?;

        if removes_current && self.loaded {
            self.stop();
        }

        let len = self.playlist.len();
        self.emit( PlayerEvent::TracksChanged { len } );
        self.refresh_current();

        self.settings.set_current_track( self.playlist.current_track_index() )?;
        Ok( removed )
    }


    /// Removes the track under the cursor.
    pub fn remove_current( &mut self ) -> Result<PathBuf, PlayerError> {
        if self.playlist.is_empty() {
            return Err( PlayerError::IndexOutOfRange { index: 0, len: 0 } );
        }
        self.remove_track( self.playlist.current_track_index() )
    }


    /// Gets the current playback state.
    pub fn state( &self ) -> PlaybackState {
        self.state
    }


    /// Gets the active playlist.
    pub fn playlist( &self ) -> &Playlist {
        &self.playlist
    }


    /// Gets the track under the cursor, if any.
    pub fn current_track( &self ) -> Option<&Track> {
        self.current.as_ref().map( |( _, t )| t )
    }


    /// Gets the current volume, 0 to 100.
    pub fn volume( &self ) -> u8 {
        self.volume
    }


    /// Gets the playhead position of the loaded track.
    pub fn position_ms( &self ) -> u64 {
        if self.loaded { self.engine.current_position() } else { 0 }
    }


    /// Gets the length of the loaded track, if known.
    pub fn duration_ms( &self ) -> Option<u64> {
        if self.loaded { self.engine.duration() } else { None }
    }


    pub fn settings( &self ) -> &SettingsStore {
        &self.settings
    }


    pub fn paths( &self ) -> &AppPaths {
        &self.paths
    }


    pub fn engine( &self ) -> &E {
        &self.engine
    }


    pub fn engine_mut( &mut self ) -> &mut E {
        &mut self.engine
    }
}


impl<E: AudioEngine> Drop for PlaybackController<E> {
    fn drop( &mut self ) {
        self.engine.stop();
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::{ tempdir, TempDir };


    /// Scripted engine that records every call.
    #[derive( Debug, Default )]
    struct MockEngine {
        pub calls: Vec<String>,
        pub broken: HashSet<PathBuf>,
        pub loaded: Option<PathBuf>,
        pub running: bool,
        pub paused: bool,
        pub ended: bool,
        pub position_ms: u64,
        pub volume: f32,
    }


    impl AudioEngine for MockEngine {
        fn load( &mut self, path: &Path ) -> Result<(), EngineError> {
            self.calls.push( format!( "load {}", path.display() ) );
            self.running = false;
            if self.broken.contains( path ) {
                self.loaded = None;
                return Err( EngineError::UnsupportedFormat );
            }
            self.loaded = Some( path.to_path_buf() );
            self.position_ms = 0;
            Ok(())
        }

        fn play( &mut self ) -> Result<(), EngineError> {
            self.calls.push( "play".into() );
            if self.loaded.is_none() {
                return Err( EngineError::NotLoaded );
            }
            self.running = true;
            self.paused = false;
            self.ended = false;
            Ok(())
        }

        fn pause( &mut self ) {
            self.calls.push( "pause".into() );
            self.paused = true;
        }

        fn unpause( &mut self ) {
            self.calls.push( "unpause".into() );
            self.paused = false;
        }

        fn stop( &mut self ) {
            self.calls.push( "stop".into() );
            self.loaded = None;
            self.running = false;
        }

        fn set_volume( &mut self, volume: f32 ) {
            self.volume = volume;
        }

        fn seek( &mut self, position_ms: u64 ) -> Result<(), EngineError> {
            self.calls.push( format!( "seek {}", position_ms ) );
            self.position_ms = position_ms;
            Ok(())
        }

        fn current_position( &self ) -> u64 {
            self.position_ms
        }

        fn duration( &self ) -> Option<u64> {
            self.loaded.as_ref().map( |_| 180_000 )
        }

        fn is_stream_active( &self ) -> bool {
            self.running && !self.ended
        }
    }


    type Controller = PlaybackController<MockEngine>;


    fn fresh() -> ( TempDir, Controller ) {
        let dir = tempdir().unwrap();
        let controller = PlaybackController::restore( AppPaths::new( dir.path() ), MockEngine::default() ).unwrap();
        ( dir, controller )
    }


    fn with_tracks( names: &[&str] ) -> ( TempDir, Controller ) {
        let ( dir, mut controller ) = fresh();
        controller.add_files( names.iter().copied() ).unwrap();
        controller.engine_mut().calls.clear();
        ( dir, controller )
    }


    fn index_of( controller: &Controller ) -> usize {
        controller.playlist().current_track_index()
    }


    fn drain( rx: &mpsc::Receiver<PlayerEvent> ) -> Vec<PlayerEvent> {
        rx.try_iter().collect()
    }


    #[test]
    fn test_restore_on_fresh_directory() {
        let ( dir, controller ) = fresh();
        let paths = AppPaths::new( dir.path() );

        assert!( paths.settings_file().exists() );
        assert!( paths.default_playlist().exists() );
        assert_eq!( controller.playlist().name(), "default" );
        assert_eq!( controller.state(), PlaybackState::Stopped );
        assert!( controller.current_track().is_none() );
    }


    #[test]
    fn test_restore_reopens_last_playlist_and_track() {
        let dir = tempdir().unwrap();
        {
            let mut controller = PlaybackController::restore( AppPaths::new( dir.path() ), MockEngine::default() ).unwrap();
            controller.create_playlist( "party" ).unwrap();
            controller.add_files( [ "a.mp3", "b.mp3" ] ).unwrap();
            controller.select_track( 1 ).unwrap();
        }

        let controller = PlaybackController::restore( AppPaths::new( dir.path() ), MockEngine::default() ).unwrap();
        assert_eq!( controller.playlist().name(), "party" );
        assert_eq!( index_of( &controller ), 1 );
        assert_eq!( controller.current_track().unwrap().path, PathBuf::from( "b.mp3" ) );
        assert_eq!( controller.settings().settings().current_track, 1 );
    }


    #[test]
    fn test_restore_falls_back_from_corrupt_playlist() {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new( dir.path() );
        {
            let mut controller = PlaybackController::restore( paths.clone(), MockEngine::default() ).unwrap();
            controller.create_playlist( "broken" ).unwrap();
        }
        fs::write( paths.playlist_path( "broken" ), "garbage" ).unwrap();

        let controller = PlaybackController::restore( paths.clone(), MockEngine::default() ).unwrap();

        assert_eq!( controller.playlist().path(), paths.default_playlist() );
        assert_eq!( controller.settings().settings().opened_playlist, paths.default_playlist() );
        assert_eq!( fs::read_to_string( paths.playlist_path( "broken" ) ).unwrap(), "garbage" );
    }


    #[test]
    fn test_restore_fails_on_corrupt_settings() {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new( dir.path() );
        fs::write( paths.settings_file(), "[1, 2]" ).unwrap();

        let result = PlaybackController::restore( paths, MockEngine::default() );
        assert!( matches!( result, Err( PlayerError::Settings( SettingsError::Corrupt { .. } ) ) ) );
    }


    #[test]
    fn test_play_from_stopped_loads_and_starts_current() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3" ] );

        controller.play().unwrap();

        assert_eq!( controller.state(), PlaybackState::Playing );
        assert_eq!( controller.engine().calls, vec![ "load a.mp3", "play" ] );
    }


    #[test]
    fn test_play_is_idempotent_while_playing() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );
        controller.play().unwrap();
        controller.engine_mut().calls.clear();

        controller.play().unwrap();

        assert_eq!( controller.state(), PlaybackState::Playing );
        assert!( controller.engine().calls.is_empty() );
    }


    #[test]
    fn test_play_on_empty_playlist_does_nothing() {
        let ( _dir, mut controller ) = fresh();
        controller.play().unwrap();
        assert_eq!( controller.state(), PlaybackState::Stopped );
        assert!( controller.engine().calls.is_empty() );
    }


    #[test]
    fn test_pause_toggles_and_play_resumes_without_reload() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );
        controller.play().unwrap();

        controller.pause();
        assert_eq!( controller.state(), PlaybackState::Paused );
        controller.pause();
        assert_eq!( controller.state(), PlaybackState::Playing );
        controller.pause();
        controller.play().unwrap();
        assert_eq!( controller.state(), PlaybackState::Playing );

        assert_eq!( controller.engine().calls, vec![ "load a.mp3", "play", "pause", "unpause", "pause", "unpause" ] );
    }


    #[test]
    fn test_pause_from_stopped_is_noop() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );
        controller.pause();
        assert_eq!( controller.state(), PlaybackState::Stopped );
        assert!( controller.engine().calls.is_empty() );
    }


    #[test]
    fn test_stop_from_every_state() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );

        controller.stop();
        assert_eq!( controller.state(), PlaybackState::Stopped );

        controller.play().unwrap();
        controller.stop();
        assert_eq!( controller.state(), PlaybackState::Stopped );
        assert!( controller.engine().loaded.is_none() );

        controller.play().unwrap();
        controller.pause();
        controller.stop();
        assert_eq!( controller.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_play_after_stop_reloads() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );
        controller.play().unwrap();
        controller.stop();
        controller.engine_mut().calls.clear();

        controller.play().unwrap();

        assert_eq!( controller.engine().calls, vec![ "load a.mp3", "play" ] );
    }


    #[test]
    fn test_next_wraps_to_first() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3", "c.mp3" ] );
        controller.select_track( 2 ).unwrap();

        controller.next().unwrap();

        assert_eq!( index_of( &controller ), 0 );
        assert_eq!( controller.state(), PlaybackState::Playing );
        assert_eq!( controller.engine().loaded, Some( PathBuf::from( "a.mp3" ) ) );
    }


    #[test]
    fn test_prev_wraps_to_last() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3", "c.mp3" ] );

        controller.prev().unwrap();

        assert_eq!( index_of( &controller ), 2 );
        assert_eq!( controller.current_track().unwrap().path, PathBuf::from( "c.mp3" ) );
    }


    #[test]
    fn test_next_full_lap_returns_to_start() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3", "c.mp3", "d.mp3" ] );
        controller.select_track( 1 ).unwrap();

        for _ in 0..4 {
            controller.next().unwrap();
        }

        assert_eq!( index_of( &controller ), 1 );
    }


    #[test]
    fn test_next_and_prev_on_empty_playlist_are_noops() {
        let ( _dir, mut controller ) = fresh();

        controller.next().unwrap();
        controller.prev().unwrap();

        assert_eq!( controller.state(), PlaybackState::Stopped );
        assert!( controller.engine().calls.is_empty() );
    }


    #[test]
    fn test_cursor_is_persisted_to_playlist_and_settings() {
        let ( dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3", "c.mp3" ] );
        controller.next().unwrap();

        let paths = AppPaths::new( dir.path() );
        let on_disk = Playlist::load( &paths.default_playlist() ).unwrap();
        assert_eq!( on_disk.current_track_index(), 1 );
        assert_eq!( SettingsStore::load( &paths ).unwrap().settings().current_track, 1 );
    }


    #[test]
    fn test_select_same_track_does_not_reload() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3" ] );
        controller.play().unwrap();
        controller.engine_mut().calls.clear();

        let track = controller.select_track( 0 ).unwrap().cloned();

        assert_eq!( track.unwrap().path, PathBuf::from( "a.mp3" ) );
        assert!( controller.engine().calls.is_empty() );
    }


    #[test]
    fn test_select_other_track_while_playing_switches() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3" ] );
        controller.play().unwrap();
        controller.engine_mut().calls.clear();

        controller.select_track( 1 ).unwrap();

        assert_eq!( controller.state(), PlaybackState::Playing );
        assert_eq!( controller.engine().calls, vec![ "load b.mp3", "play" ] );
    }


    #[test]
    fn test_select_duplicate_entry_while_playing_restarts_it() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3", "a.mp3" ] );
        controller.play().unwrap();
        controller.engine_mut().position_ms = 90_000;
        controller.engine_mut().calls.clear();

        controller.select_track( 2 ).unwrap();

        assert_eq!( index_of( &controller ), 2 );
        assert_eq!( controller.state(), PlaybackState::Playing );
        assert_eq!( controller.engine().calls, vec![ "load a.mp3", "play" ] );
        assert_eq!( controller.position_ms(), 0 );
    }


    #[test]
    fn test_select_while_stopped_loads_without_playing() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3" ] );

        controller.select_track( 1 ).unwrap();
        assert_eq!( controller.state(), PlaybackState::Stopped );
        assert_eq!( controller.engine().loaded, Some( PathBuf::from( "b.mp3" ) ) );

        controller.engine_mut().calls.clear();
        controller.play().unwrap();
        assert_eq!( controller.engine().calls, vec![ "play" ] );
    }


    #[test]
    fn test_select_out_of_range_is_rejected() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );

        let result = controller.select_track( 3 );

        assert!( matches!( result, Err( PlayerError::IndexOutOfRange { index: 3, len: 1 } ) ) );
        assert_eq!( index_of( &controller ), 0 );
    }


    #[test]
    fn test_select_on_empty_playlist_yields_nothing_and_stops() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );
        controller.play().unwrap();
        controller.remove_track( 0 ).unwrap();

        assert!( controller.select_track( 0 ).unwrap().is_none() );
        assert_eq!( controller.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_load_failure_stops_and_moves_cursor_on() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "bad.mp3", "c.mp3" ] );
        controller.engine_mut().broken.insert( PathBuf::from( "bad.mp3" ) );
        controller.play().unwrap();

        let result = controller.next();

        assert!( matches!( result, Err( PlayerError::EngineLoad { .. } ) ) );
        assert_eq!( controller.state(), PlaybackState::Stopped );
        assert_eq!( index_of( &controller ), 2 );

        controller.play().unwrap();
        assert_eq!( controller.engine().loaded, Some( PathBuf::from( "c.mp3" ) ) );
    }


    #[test]
    fn test_load_failure_on_prev_moves_backwards() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3", "bad.mp3" ] );
        controller.engine_mut().broken.insert( PathBuf::from( "bad.mp3" ) );

        assert!( controller.prev().is_err() );
        assert_eq!( index_of( &controller ), 1 );
    }


    #[test]
    fn test_tick_is_idle_unless_playing() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );
        assert_eq!( controller.tick().unwrap(), TickOutcome::Idle );

        controller.play().unwrap();
        controller.pause();
        assert_eq!( controller.tick().unwrap(), TickOutcome::Idle );
    }


    #[test]
    fn test_tick_publishes_position() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );
        let rx = controller.subscribe();
        controller.play().unwrap();
        controller.engine_mut().position_ms = 4_200;
        drain( &rx );

        assert_eq!( controller.tick().unwrap(), TickOutcome::Position { position_ms: 4_200 } );
        assert_eq!( drain( &rx ), vec![ PlayerEvent::PositionChanged { position_ms: 4_200, duration_ms: Some( 180_000 ) } ] );
    }


    #[test]
    fn test_seek_suppresses_exactly_one_tick() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );
        controller.play().unwrap();

        controller.seek( 60_000 ).unwrap();

        assert_eq!( controller.tick().unwrap(), TickOutcome::Suppressed );
        assert_eq!( controller.tick().unwrap(), TickOutcome::Position { position_ms: 60_000 } );
    }


    #[test]
    fn test_seek_without_track_fails() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );
        assert!( matches!( controller.seek( 1_000 ), Err( PlayerError::NoTrack ) ) );
    }


    #[test]
    fn test_end_of_stream_advances() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3" ] );
        controller.play().unwrap();
        controller.engine_mut().ended = true;

        assert_eq!( controller.tick().unwrap(), TickOutcome::Advanced { index: 1 } );
        assert_eq!( controller.state(), PlaybackState::Playing );
        assert_eq!( controller.engine().loaded, Some( PathBuf::from( "b.mp3" ) ) );
    }


    #[test]
    fn test_end_of_stream_skips_unplayable_tracks() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "bad1.mp3", "bad2.mp3", "d.mp3" ] );
        controller.engine_mut().broken.insert( PathBuf::from( "bad1.mp3" ) );
        controller.engine_mut().broken.insert( PathBuf::from( "bad2.mp3" ) );
        controller.play().unwrap();
        controller.engine_mut().ended = true;

        assert_eq!( controller.tick().unwrap(), TickOutcome::Advanced { index: 3 } );
        assert_eq!( controller.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_end_of_stream_gives_up_after_one_lap() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "bad.mp3" ] );
        controller.play().unwrap();
        controller.engine_mut().broken.insert( PathBuf::from( "bad.mp3" ) );
        controller.engine_mut().broken.insert( PathBuf::from( "a.mp3" ) );
        controller.engine_mut().ended = true;

        assert_eq!( controller.tick().unwrap(), TickOutcome::AdvanceFailed );
        assert_eq!( controller.state(), PlaybackState::Stopped );
    }


    #[test]
    fn test_remove_before_current_keeps_logical_track() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3", "c.mp3" ] );
        controller.select_track( 1 ).unwrap();

        controller.remove_track( 0 ).unwrap();

        assert_eq!( index_of( &controller ), 0 );
        assert_eq!( controller.playlist().len(), 2 );
        assert_eq!( controller.current_track().unwrap().path, PathBuf::from( "b.mp3" ) );
        assert_eq!( controller.settings().settings().current_track, 0 );
    }


    #[test]
    fn test_remove_playing_track_stops() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3" ] );
        controller.play().unwrap();

        let removed = controller.remove_current().unwrap();

        assert_eq!( removed, PathBuf::from( "a.mp3" ) );
        assert_eq!( controller.state(), PlaybackState::Stopped );
        assert_eq!( controller.current_track().unwrap().path, PathBuf::from( "b.mp3" ) );
    }


    #[test]
    fn test_remove_other_track_keeps_playing() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3" ] );
        controller.play().unwrap();

        controller.remove_track( 1 ).unwrap();

        assert_eq!( controller.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_remove_keeps_view_consistent_when_settings_write_fails() {
        let ( dir, mut controller ) = with_tracks( &[ "a.mp3", "b.mp3" ] );
        let rx = controller.subscribe();
        let paths = AppPaths::new( dir.path() );
        fs::remove_file( paths.settings_file() ).unwrap();
        fs::create_dir( paths.settings_file() ).unwrap();

        let result = controller.remove_track( 0 );

        assert!( matches!( result, Err( PlayerError::Settings( _ ) ) ) );
        assert_eq!( controller.playlist().len(), 1 );
        assert_eq!( controller.current_track().unwrap().path, PathBuf::from( "b.mp3" ) );
        assert!( drain( &rx ).contains( &PlayerEvent::TracksChanged { len: 1 } ) );
    }


    #[test]
    fn test_remove_current_on_empty_playlist_fails() {
        let ( _dir, mut controller ) = fresh();
        assert!( matches!( controller.remove_current(), Err( PlayerError::IndexOutOfRange { index: 0, len: 0 } ) ) );
    }


    #[test]
    fn test_create_playlist_switches_and_records_it() {
        let ( dir, mut controller ) = with_tracks( &[ "a.mp3" ] );
        controller.play().unwrap();
        let rx = controller.subscribe();

        controller.create_playlist( "party" ).unwrap();

        let paths = AppPaths::new( dir.path() );
        assert_eq!( controller.state(), PlaybackState::Stopped );
        assert_eq!( controller.playlist().name(), "party" );
        assert!( controller.playlist().is_empty() );
        assert!( controller.current_track().is_none() );
        assert_eq!( controller.settings().settings().opened_playlist, paths.playlist_path( "party" ) );

        let events = drain( &rx );
        assert!( events.contains( &PlayerEvent::PlaylistChanged {
            name: "party".into(),
            path: paths.playlist_path( "party" ),
            len: 0,
        }));
    }


    #[test]
    fn test_open_playlist_restores_its_cursor() {
        let ( dir, mut controller ) = fresh();
        let other = dir.path().join( "elsewhere.playlist" );
        fs::write( &other, r#"{ "name": "other", "tracks": [ "x.mp3", "y.mp3" ], "current_track_index": 1 }"# ).unwrap();

        controller.open_playlist( &other ).unwrap();

        assert_eq!( controller.playlist().name(), "other" );
        assert_eq!( controller.current_track().unwrap().path, PathBuf::from( "y.mp3" ) );
        assert_eq!( controller.settings().settings().current_track, 1 );
    }


    #[test]
    fn test_add_files_filters_and_caches_first_track() {
        let ( _dir, mut controller ) = fresh();
        let rx = controller.subscribe();

        let added = controller.add_files( [ "song.mp3", "doc.txt", "beat.flac" ] ).unwrap();

        assert_eq!( added, 2 );
        assert_eq!( controller.playlist().tracks(), &[ PathBuf::from( "song.mp3" ), PathBuf::from( "beat.flac" ) ] );
        assert_eq!( controller.current_track().unwrap().path, PathBuf::from( "song.mp3" ) );
        let events = drain( &rx );
        assert_eq!( events[ 0 ], PlayerEvent::TracksChanged { len: 2 } );
        assert!( events.contains( &PlayerEvent::CurrentIndexChanged { index: 0 } ) );
    }


    #[test]
    fn test_add_folder() {
        let ( dir, mut controller ) = fresh();
        let music = dir.path().join( "music" );
        fs::create_dir_all( music.join( "sub" ) ).unwrap();
        fs::write( music.join( "one.mp3" ), b"" ).unwrap();
        fs::write( music.join( "sub" ).join( "two.ogg" ), b"" ).unwrap();
        fs::write( music.join( "cover.png" ), b"" ).unwrap();

        assert_eq!( controller.add_folder( &music ).unwrap(), 2 );
        assert_eq!( controller.playlist().tracks(), &[ music.join( "one.mp3" ), music.join( "sub" ).join( "two.ogg" ) ] );
    }


    #[test]
    fn test_set_volume_clamps_and_scales() {
        let ( _dir, mut controller ) = fresh();

        controller.set_volume( 40 );
        assert_eq!( controller.volume(), 40 );
        assert!(( controller.engine().volume - 0.4 ).abs() < 1e-6 );

        controller.set_volume( 250 );
        assert_eq!( controller.volume(), 100 );
        assert!(( controller.engine().volume - 1.0 ).abs() < 1e-6 );
    }


    #[test]
    fn test_state_changes_are_published() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );
        let rx = controller.subscribe();

        controller.play().unwrap();
        controller.pause();
        controller.stop();

        let states: Vec<PlaybackState> = drain( &rx ).into_iter()
            .filter_map( |e| match e {
                PlayerEvent::StateChanged { state } => Some( state ),
                _ => None,
            })
            .collect();
        assert_eq!( states, vec![ PlaybackState::Playing, PlaybackState::Paused, PlaybackState::Stopped ] );
    }


    #[test]
    fn test_dropped_listener_is_pruned() {
        let ( _dir, mut controller ) = with_tracks( &[ "a.mp3" ] );
        drop( controller.subscribe() );
        let rx = controller.subscribe();

        controller.play().unwrap();

        assert_eq!( controller.listeners.len(), 1 );
        assert!( !drain( &rx ).is_empty() );
    }
}
