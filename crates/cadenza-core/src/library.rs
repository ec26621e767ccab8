//! Folder scanning
//!
//! Discovers audio files below a directory so whole folders can be added to
//! a playlist at once.

use std::path::{ Path, PathBuf };

use thiserror::Error;


/// Audio file extensions accepted into playlists.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "mp4", "asf", "ogg", "aiff", "aac", "wma", "alac",
];


/// Errors that can occur while scanning a folder.
#[derive( Debug, Error )]
pub enum LibraryError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Path not found: {0}" )]
    NotFound( PathBuf ),
}


/// Checks if a file has a supported audio extension.
///
/// Only the extension is inspected, case-insensitively.
pub fn is_supported_audio( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.iter().any( |s| s.eq_ignore_ascii_case( e ) ) )
        .unwrap_or( false )
}


/// Recursively collects supported audio files below `root`.
///
/// Entries are visited in name order so repeated scans add tracks in the
/// same order. Unreadable subdirectories are skipped.
pub fn scan_folder( root: &Path ) -> Result<Vec<PathBuf>, LibraryError> {
    tracing::info!( "Scanning: {:?}", root );

    let mut found = Vec::new();
    scan_recursive( root, &mut found, true )?;

    tracing::info!( "Found {} tracks in {:?}", found.len(), root );
    Ok( found )
}


fn scan_recursive( dir: &Path, found: &mut Vec<PathBuf>, is_root: bool ) -> Result<(), LibraryError> {
    let entries = match std::fs::read_dir( dir ) {
        Ok( e ) => e,
        Err( e ) if e.kind() == std::io::ErrorKind::NotFound && is_root => {
            return Err( LibraryError::NotFound( dir.to_path_buf() ) );
        }
        Err( e ) if is_root => return Err( LibraryError::Io( e ) ),
        Err( e ) => {
            tracing::warn!( "Skipping {:?}: {}", dir, e );
            return Ok(());
        }
    };

    let mut paths: Vec<PathBuf> = entries.flatten().map( |entry| entry.path() ).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            scan_recursive( &path, found, false )?;
        } else if is_supported_audio( &path ) {
            found.push( path );
        }
    }

    Ok(())
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;


    #[test]
    fn test_supported_extensions() {
        assert!( is_supported_audio( Path::new( "a.mp3" ) ) );
        assert!( is_supported_audio( Path::new( "/x/y/B.FLAC" ) ) );
        assert!( is_supported_audio( Path::new( "c.Alac" ) ) );
        assert!( !is_supported_audio( Path::new( "d.txt" ) ) );
        assert!( !is_supported_audio( Path::new( "mp3" ) ) );
        assert!( !is_supported_audio( Path::new( "e.m4a" ) ) );
    }


    #[test]
    fn test_scan_is_recursive_filtered_and_sorted() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all( root.join( "b_album" ).join( "disc2" ) ).unwrap();
        for file in [ "z.mp3", "cover.jpg", "a.wav", "b_album/02.flac", "b_album/01.flac", "b_album/disc2/x.ogg", "notes.txt" ] {
            fs::write( root.join( file ), b"" ).unwrap();
        }

        let found = scan_folder( root ).unwrap();

        let relative: Vec<PathBuf> = found.iter()
            .map( |p| p.strip_prefix( root ).unwrap().to_path_buf() )
            .collect();
        assert_eq!( relative, vec![
            PathBuf::from( "a.wav" ),
            PathBuf::from( "b_album/01.flac" ),
            PathBuf::from( "b_album/02.flac" ),
            PathBuf::from( "b_album/disc2/x.ogg" ),
            PathBuf::from( "z.mp3" ),
        ]);
    }


    #[test]
    fn test_scan_missing_root() {
        let dir = tempdir().unwrap();
        let result = scan_folder( &dir.path().join( "nope" ) );
        assert!( matches!( result, Err( LibraryError::NotFound( _ ) ) ) );
    }
}
