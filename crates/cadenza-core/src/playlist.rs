//! Playlist management
//!
//! A playlist is a named, ordered list of track paths plus a cursor. Each
//! playlist lives in its own JSON file and is saved after every mutation.

use std::fs;
use std::io;
use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };
use thiserror::Error;

use crate::library::is_supported_audio;
use crate::paths::PLAYLIST_EXTENSION;
use crate::persist;


/// Errors that can occur with playlist operations.
#[derive( Debug, Error )]
pub enum PlaylistError {
    #[error( "IO error on playlist {path}: {source}" )]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error( "Playlist {path} is corrupt: {source}" )]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error( "Track index {index} out of range for playlist of {len} tracks" )]
    IndexOutOfRange { index: usize, len: usize },
}


/// On-disk shape of a playlist file.
#[derive( Debug, Serialize, Deserialize )]
struct PlaylistFile {
    name: String,
    tracks: Vec<PathBuf>,
    #[serde( default )]
    current_track_index: usize,
}


/// A persisted playlist.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct Playlist {
    path: PathBuf,
    name: String,
    tracks: Vec<PathBuf>,
    current_index: usize,
}


impl Playlist {
    /// Opens the playlist at `path`, creating an empty one if the file does
    /// not exist yet. Existing files are loaded, never overwritten.
    pub fn open_or_create( path: impl Into<PathBuf> ) -> Result<Self, PlaylistError> {
        let path = path.into();

        if path.exists() {
            return Self::load( &path );
        }

        let name = path.file_stem()
            .map( |s| s.to_string_lossy().into_owned() )
            .unwrap_or_default();

        let playlist = Self {
            path,
            name,
            tracks: Vec::new(),
            current_index: 0,
        };
        playlist.save()?;

        tracing::info!( "Created playlist {:?} at {:?}", playlist.name, playlist.path );
        Ok( playlist )
    }


    /// Opens or creates the playlist called `name` inside `dir`.
    pub fn open_or_create_named( dir: &Path, name: &str ) -> Result<Self, PlaylistError> {
        Self::open_or_create( dir.join( format!( "{}.{}", name, PLAYLIST_EXTENSION ) ) )
    }


    /// Loads a playlist file.
    pub fn load( path: &Path ) -> Result<Self, PlaylistError> {
        let raw = fs::read_to_string( path )
            .map_err( |source| PlaylistError::Io { path: path.to_path_buf(), source } )?;

        let file: PlaylistFile = serde_json::from_str( &raw )
            .map_err( |source| PlaylistError::Corrupt { path: path.to_path_buf(), source } )?;

        let mut playlist = Self {
            path: path.to_path_buf(),
            name: file.name,
            tracks: file.tracks,
            current_index: 0,
        };
        playlist.current_index = playlist.clamp_index( file.current_track_index );

        tracing::debug!( "Loaded playlist {:?} ({} tracks)", playlist.name, playlist.tracks.len() );
        Ok( playlist )
    }


    /// Writes the playlist to its file.
    pub fn save( &self ) -> Result<(), PlaylistError> {
        let file = PlaylistFile {
            name: self.name.clone(),
            tracks: self.tracks.clone(),
            current_track_index: self.current_index,
        };

        persist::write_json( &self.path, &file )
            .map_err( |source| PlaylistError::Io { path: self.path.clone(), source } )
    }


    /// Appends the supported audio files from `paths`, in order.
    ///
    /// Returns the number of tracks added. Files with other extensions are
    /// skipped.
    pub fn add_tracks<I, P>( &mut self, paths: I ) -> Result<usize, PlaylistError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let before = self.tracks.len();

        for path in paths {
            let path = path.into();
            if is_supported_audio( &path ) {
                self.tracks.push( path );
            } else {
                tracing::debug!( "Skipping unsupported file {:?}", path );
            }
        }

        let added = self.tracks.len() - before;
        self.save()?;
        Ok( added )
    }


    /// Removes the track at `index` and returns its path.
    ///
    /// The cursor keeps pointing at the same logical track when an earlier
    /// entry is removed. Removing the current track leaves the cursor on
    /// whatever slides into its slot, clamped to the new last entry.
    pub fn remove_track( &mut self, index: usize ) -> Result<PathBuf, PlaylistError> {
        if index >= self.tracks.len() {
            return Err( PlaylistError::IndexOutOfRange { index, len: self.tracks.len() } );
        }

        let removed = self.tracks.remove( index );

        if index < self.current_index {
            self.current_index -= 1;
        }
        self.current_index = self.clamp_index( self.current_index );

        self.save()?;
        Ok( removed )
    }


    /// Moves the cursor, clamped to the valid range, and persists.
    pub fn set_current_track_index( &mut self, index: usize ) -> Result<(), PlaylistError> {
        self.current_index = self.clamp_index( index );
        self.save()
    }


    fn clamp_index( &self, index: usize ) -> usize {
        index.min( self.tracks.len().saturating_sub( 1 ) )
    }


    /// Gets the track under the cursor.
    pub fn current_track( &self ) -> Option<&PathBuf> {
        self.tracks.get( self.current_index )
    }


    /// Gets the cursor position.
    pub fn current_track_index( &self ) -> usize {
        self.current_index
    }


    /// Gets the track at `index`.
    pub fn get( &self, index: usize ) -> Option<&PathBuf> {
        self.tracks.get( index )
    }


    /// Gets all tracks in the playlist.
    pub fn tracks( &self ) -> &[PathBuf] {
        &self.tracks
    }


    /// Gets the number of tracks.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Returns true if the playlist is empty.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }


    pub fn name( &self ) -> &str {
        &self.name
    }


    pub fn path( &self ) -> &Path {
        &self.path
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::{ tempdir, TempDir };


    fn playlist_with( dir: &TempDir, tracks: &[&str] ) -> Playlist {
        let mut playlist = Playlist::open_or_create( dir.path().join( "mix.playlist" ) ).unwrap();
        playlist.add_tracks( tracks.iter().copied() ).unwrap();
        playlist
    }


    fn paths( names: &[&str] ) -> Vec<PathBuf> {
        names.iter().map( PathBuf::from ).collect()
    }


    #[test]
    fn test_create_named_playlist() {
        let dir = tempdir().unwrap();
        let playlist = Playlist::open_or_create_named( dir.path(), "party" ).unwrap();

        assert_eq!( playlist.name(), "party" );
        assert!( playlist.is_empty() );
        assert_eq!( playlist.current_track_index(), 0 );
        assert!( dir.path().join( "party.playlist" ).exists() );
    }


    #[test]
    fn test_create_makes_parent_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join( "playlists" ).join( "default.playlist" );

        let playlist = Playlist::open_or_create( &path ).unwrap();

        assert_eq!( playlist.name(), "default" );
        assert!( path.exists() );
    }


    #[test]
    fn test_open_existing_does_not_overwrite() {
        let dir = tempdir().unwrap();
        playlist_with( &dir, &[ "a.mp3", "b.mp3" ] );

        let reopened = Playlist::open_or_create( dir.path().join( "mix.playlist" ) ).unwrap();
        assert_eq!( reopened.tracks(), paths( &[ "a.mp3", "b.mp3" ] ).as_slice() );
    }


    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let mut playlist = playlist_with( &dir, &[ "a.mp3", "b.flac", "a.mp3" ] );
        playlist.set_current_track_index( 2 ).unwrap();

        let loaded = Playlist::load( playlist.path() ).unwrap();
        assert_eq!( loaded, playlist );
    }


    #[test]
    fn test_add_filters_unsupported_extensions() {
        let dir = tempdir().unwrap();
        let mut playlist = playlist_with( &dir, &[] );

        let added = playlist.add_tracks( [ "song.mp3", "doc.txt", "beat.flac" ] ).unwrap();

        assert_eq!( added, 2 );
        assert_eq!( playlist.tracks(), paths( &[ "song.mp3", "beat.flac" ] ).as_slice() );
    }


    #[test]
    fn test_add_matches_extension_case_insensitively() {
        let dir = tempdir().unwrap();
        let mut playlist = playlist_with( &dir, &[] );

        playlist.add_tracks( [ "LOUD.MP3", "Mixed.Ogg", "noext", "archive.mp3.zip" ] ).unwrap();

        assert_eq!( playlist.tracks(), paths( &[ "LOUD.MP3", "Mixed.Ogg" ] ).as_slice() );
    }


    #[test]
    fn test_remove_before_current_shifts_cursor() {
        let dir = tempdir().unwrap();
        let mut playlist = playlist_with( &dir, &[ "a.mp3", "b.mp3", "c.mp3" ] );
        playlist.set_current_track_index( 1 ).unwrap();

        let removed = playlist.remove_track( 0 ).unwrap();

        assert_eq!( removed, PathBuf::from( "a.mp3" ) );
        assert_eq!( playlist.len(), 2 );
        assert_eq!( playlist.current_track_index(), 0 );
        assert_eq!( playlist.current_track(), Some( &PathBuf::from( "b.mp3" ) ) );
    }


    #[test]
    fn test_remove_current_keeps_slot() {
        let dir = tempdir().unwrap();
        let mut playlist = playlist_with( &dir, &[ "a.mp3", "b.mp3", "c.mp3" ] );
        playlist.set_current_track_index( 1 ).unwrap();

        playlist.remove_track( 1 ).unwrap();

        assert_eq!( playlist.current_track_index(), 1 );
        assert_eq!( playlist.current_track(), Some( &PathBuf::from( "c.mp3" ) ) );
    }


    #[test]
    fn test_remove_current_last_slot_clamps() {
        let dir = tempdir().unwrap();
        let mut playlist = playlist_with( &dir, &[ "a.mp3", "b.mp3", "c.mp3" ] );
        playlist.set_current_track_index( 2 ).unwrap();

        playlist.remove_track( 2 ).unwrap();

        assert_eq!( playlist.current_track_index(), 1 );
    }


    #[test]
    fn test_remove_after_current_keeps_cursor() {
        let dir = tempdir().unwrap();
        let mut playlist = playlist_with( &dir, &[ "a.mp3", "b.mp3", "c.mp3" ] );

        playlist.remove_track( 2 ).unwrap();

        assert_eq!( playlist.current_track_index(), 0 );
    }


    #[test]
    fn test_remove_last_track_empties_playlist() {
        let dir = tempdir().unwrap();
        let mut playlist = playlist_with( &dir, &[ "a.mp3" ] );

        playlist.remove_track( 0 ).unwrap();

        assert!( playlist.is_empty() );
        assert_eq!( playlist.current_track_index(), 0 );
        assert_eq!( playlist.current_track(), None );
    }


    #[test]
    fn test_remove_out_of_range_is_rejected() {
        let dir = tempdir().unwrap();
        let mut playlist = playlist_with( &dir, &[ "a.mp3", "b.mp3" ] );

        let result = playlist.remove_track( 2 );

        assert!( matches!( result, Err( PlaylistError::IndexOutOfRange { index: 2, len: 2 } ) ) );
        assert_eq!( playlist.len(), 2 );
    }


    #[test]
    fn test_set_current_index_clamps_and_persists() {
        let dir = tempdir().unwrap();
        let mut playlist = playlist_with( &dir, &[ "a.mp3", "b.mp3" ] );

        playlist.set_current_track_index( 9 ).unwrap();
        assert_eq!( playlist.current_track_index(), 1 );

        let loaded = Playlist::load( playlist.path() ).unwrap();
        assert_eq!( loaded.current_track_index(), 1 );
    }


    #[test]
    fn test_mutations_persist_immediately() {
        let dir = tempdir().unwrap();
        let mut playlist = playlist_with( &dir, &[ "a.mp3", "b.mp3" ] );
        playlist.remove_track( 0 ).unwrap();

        let loaded = Playlist::load( playlist.path() ).unwrap();
        assert_eq!( loaded.tracks(), paths( &[ "b.mp3" ] ).as_slice() );
    }


    #[test]
    fn test_corrupt_file_is_distinguishable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join( "broken.playlist" );
        fs::write( &path, "{ not json" ).unwrap();

        assert!( matches!( Playlist::load( &path ), Err( PlaylistError::Corrupt { .. } ) ) );
        assert!( matches!( Playlist::open_or_create( &path ), Err( PlaylistError::Corrupt { .. } ) ) );
    }


    #[test]
    fn test_missing_required_field_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join( "nameless.playlist" );
        fs::write( &path, r#"{ "tracks": [] }"# ).unwrap();

        assert!( matches!( Playlist::load( &path ), Err( PlaylistError::Corrupt { .. } ) ) );
    }


    #[test]
    fn test_missing_index_defaults_and_stale_index_clamps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join( "old.playlist" );

        fs::write( &path, r#"{ "name": "old", "tracks": [ "a.mp3" ] }"# ).unwrap();
        assert_eq!( Playlist::load( &path ).unwrap().current_track_index(), 0 );

        fs::write( &path, r#"{ "name": "old", "tracks": [ "a.mp3" ], "current_track_index": 7 }"# ).unwrap();
        assert_eq!( Playlist::load( &path ).unwrap().current_track_index(), 0 );
    }


    fn file_name() -> impl Strategy<Value = String> {
        let ext = prop::sample::select( vec![ "mp3", "FLAC", "txt", "jpg", "wav", "", "ogg", "pdf" ] );
        ( "[a-z]{1,8}", ext ).prop_map( |( stem, ext )| {
            if ext.is_empty() { stem } else { format!( "{}.{}", stem, ext ) }
        })
    }


    proptest! {
        #[test]
        fn prop_add_keeps_supported_only_and_preserves_order(
            first in prop::collection::vec( file_name(), 0..8 ),
            second in prop::collection::vec( file_name(), 0..8 ),
        ) {
            let dir = tempdir().unwrap();
            let mut playlist = Playlist::open_or_create( dir.path().join( "p.playlist" ) ).unwrap();

            playlist.add_tracks( first.iter() ).unwrap();
            let existing = playlist.tracks().to_vec();
            playlist.add_tracks( second.iter() ).unwrap();

            prop_assert!( playlist.tracks().iter().all( |p| is_supported_audio( p ) ) );
            prop_assert_eq!( &playlist.tracks()[ ..existing.len() ], existing.as_slice() );
        }


        #[test]
        fn prop_remove_only_drops_the_target(
            names in prop::collection::vec( "[a-z]{1,6}\\.mp3", 1..10 ),
            pick in any::<prop::sample::Index>(),
        ) {
            let dir = tempdir().unwrap();
            let mut playlist = Playlist::open_or_create( dir.path().join( "p.playlist" ) ).unwrap();
            playlist.add_tracks( names.iter() ).unwrap();

            let index = pick.index( names.len() );
            let mut expected: Vec<PathBuf> = names.iter().map( PathBuf::from ).collect();
            expected.remove( index );

            playlist.remove_track( index ).unwrap();
            prop_assert_eq!( playlist.tracks(), expected.as_slice() );
        }
    }
}
