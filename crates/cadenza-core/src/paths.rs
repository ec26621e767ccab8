//! Data directory layout
//!
//! Every file Cadenza persists lives under one root directory. The root is
//! passed around explicitly instead of being looked up globally.

use std::path::{ Path, PathBuf };


/// File name of the settings record inside the data root.
pub const SETTINGS_FILE: &str = "userdata.json";

/// Directory holding one file per playlist.
pub const PLAYLISTS_DIR: &str = "playlists";

/// Extension used for playlist files.
pub const PLAYLIST_EXTENSION: &str = "playlist";

/// Name of the playlist opened on first run.
pub const DEFAULT_PLAYLIST_NAME: &str = "default";


/// Locations of the settings file and playlist directory.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct AppPaths {
    root: PathBuf,
}


impl AppPaths {
    /// Creates a layout rooted at `root`.
    pub fn new( root: impl Into<PathBuf> ) -> Self {
        Self { root: root.into() }
    }


    /// The data root.
    pub fn root( &self ) -> &Path {
        &self.root
    }


    /// Path of the settings file.
    pub fn settings_file( &self ) -> PathBuf {
        self.root.join( SETTINGS_FILE )
    }


    /// Directory holding the playlist files.
    pub fn playlists_dir( &self ) -> PathBuf {
        self.root.join( PLAYLISTS_DIR )
    }


    /// Path of the playlist file for a bare playlist name.
    pub fn playlist_path( &self, name: &str ) -> PathBuf {
        self.playlists_dir().join( format!( "{}.{}", name, PLAYLIST_EXTENSION ) )
    }


    /// Path of the playlist opened when nothing else was recorded.
    pub fn default_playlist( &self ) -> PathBuf {
        self.playlist_path( DEFAULT_PLAYLIST_NAME )
    }
}


impl Default for AppPaths {
    fn default() -> Self {
        Self::new( "." )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_default_layout_is_relative_to_working_dir() {
        let paths = AppPaths::default();
        assert_eq!( paths.settings_file(), PathBuf::from( "./userdata.json" ) );
        assert_eq!( paths.default_playlist(), PathBuf::from( "./playlists/default.playlist" ) );
    }


    #[test]
    fn test_named_playlist_path() {
        let paths = AppPaths::new( "/data" );
        assert_eq!( paths.playlist_path( "party" ), PathBuf::from( "/data/playlists/party.playlist" ) );
    }
}
