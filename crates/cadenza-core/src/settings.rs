//! Persistent settings
//!
//! A single settings record remembers which playlist was open and which
//! track was selected. Every mutation is written through to disk.

use std::fs;
use std::io;
use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };
use thiserror::Error;

use crate::paths::AppPaths;
use crate::persist;


/// Errors that can occur loading or saving settings.
#[derive( Debug, Error )]
pub enum SettingsError {
    #[error( "IO error on settings file {path}: {source}" )]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error( "Settings file {path} is corrupt: {source}" )]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}


/// The settings record as stored on disk.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
pub struct Settings {
    /// Playlist opened when nothing else is recorded.
    pub default_playlist: PathBuf,

    /// Playlist that was open when the player last ran.
    pub opened_playlist: PathBuf,

    /// Last selected track in the opened playlist.
    #[serde( default )]
    pub current_track: usize,
}


impl Settings {
    /// First-run settings for a data directory.
    pub fn defaults_for( paths: &AppPaths ) -> Self {
        let default_playlist = paths.default_playlist();
        Self {
            opened_playlist: default_playlist.clone(),
            default_playlist,
            current_track: 0,
        }
    }
}


/// Write-through owner of the settings file.
#[derive( Debug )]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}


impl SettingsStore {
    /// Loads the settings file, creating it with defaults when absent.
    ///
    /// An existing file that does not parse is reported as
    /// [`SettingsError::Corrupt`] and left untouched.
    pub fn load( paths: &AppPaths ) -> Result<Self, SettingsError> {
        let path = paths.settings_file();

        if !path.exists() {
            tracing::info!( "Creating settings file {:?}", path );
            let store = Self { path: path.clone(), settings: Settings::defaults_for( paths ) };
            store.save()?;
        }

        let settings = Self::read( &path )?;
        Ok( Self { path, settings } )
    }


    fn read( path: &Path ) -> Result<Settings, SettingsError> {
        let raw = fs::read_to_string( path )
            .map_err( |source| SettingsError::Io { path: path.to_path_buf(), source } )?;

        serde_json::from_str( &raw )
            .map_err( |source| SettingsError::Corrupt { path: path.to_path_buf(), source } )
    }


    /// Writes the current record to disk.
    pub fn save( &self ) -> Result<(), SettingsError> {
        persist::write_json( &self.path, &self.settings )
            .map_err( |source| SettingsError::Io { path: self.path.clone(), source } )
    }


    /// Records the opened playlist and persists.
    pub fn set_opened_playlist( &mut self, playlist: impl Into<PathBuf> ) -> Result<(), SettingsError> {
        self.settings.opened_playlist = playlist.into();
        self.save()
    }


    /// Records the selected track and persists.
    pub fn set_current_track( &mut self, index: usize ) -> Result<(), SettingsError> {
        self.settings.current_track = index;
        self.save()
    }


    pub fn settings( &self ) -> &Settings {
        &self.settings
    }


    pub fn path( &self ) -> &Path {
        &self.path
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use tempfile::tempdir;


    #[test]
    fn test_first_run_creates_defaults() {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new( dir.path() );

        let store = SettingsStore::load( &paths ).unwrap();

        assert!( paths.settings_file().exists() );
        let settings = store.settings();
        assert_eq!( settings.default_playlist, paths.default_playlist() );
        assert_eq!( settings.opened_playlist, settings.default_playlist );
        assert_eq!( settings.current_track, 0 );
    }


    #[test]
    fn test_default_playlist_path_in_relative_root() {
        let settings = Settings::defaults_for( &AppPaths::default() );
        let json = serde_json::to_value( &settings ).unwrap();
        assert_eq!( json[ "default_playlist" ], "./playlists/default.playlist" );
        assert_eq!( json[ "opened_playlist" ], "./playlists/default.playlist" );
    }


    #[test]
    fn test_mutations_are_written_through() {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new( dir.path() );

        let mut store = SettingsStore::load( &paths ).unwrap();
        store.set_opened_playlist( paths.playlist_path( "party" ) ).unwrap();
        store.set_current_track( 4 ).unwrap();

        let reloaded = SettingsStore::load( &paths ).unwrap();
        assert_eq!( reloaded.settings().opened_playlist, paths.playlist_path( "party" ) );
        assert_eq!( reloaded.settings().current_track, 4 );
    }


    #[test]
    fn test_missing_current_track_defaults_to_zero() {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new( dir.path() );
        fs::write(
            paths.settings_file(),
            r#"{ "default_playlist": "a.playlist", "opened_playlist": "b.playlist" }"#,
        ).unwrap();

        let store = SettingsStore::load( &paths ).unwrap();
        assert_eq!( store.settings().opened_playlist, PathBuf::from( "b.playlist" ) );
        assert_eq!( store.settings().current_track, 0 );
    }


    #[test]
    fn test_corrupt_file_is_reported_and_kept() {
        let dir = tempdir().unwrap();
        let paths = AppPaths::new( dir.path() );
        fs::write( paths.settings_file(), r#"{ "opened_playlist": "b.playlist" }"# ).unwrap();

        let result = SettingsStore::load( &paths );

        assert!( matches!( result, Err( SettingsError::Corrupt { .. } ) ) );
        let raw = fs::read_to_string( paths.settings_file() ).unwrap();
        assert!( raw.contains( "b.playlist" ) );
    }
}
