//! JSON document persistence shared by settings and playlists.

use std::fs;
use std::io::{ self, Write };
use std::path::Path;

use serde::Serialize;


/// Serializes `value` as pretty JSON and replaces `path` with it.
///
/// The document is written to a sibling temp file first and renamed over the
/// target, so an interrupted write leaves the previous file intact.
pub( crate ) fn write_json<T: Serialize>( path: &Path, value: &T ) -> io::Result<()> {
    if let Some( parent ) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all( parent )?;
        }
    }

    let json = serde_json::to_vec_pretty( value )
        .map_err( |e| io::Error::new( io::ErrorKind::InvalidData, e ) )?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push( ".tmp" );
    let tmp_path = Path::new( &tmp_name );

    {
        let mut file = fs::File::create( tmp_path )?;
        file.write_all( &json )?;
        file.sync_all()?;
    }

    fs::rename( tmp_path, path )
}


#[cfg( test )]
mod tests {
    use super::*;
    use tempfile::tempdir;


    #[test]
    fn test_write_json_creates_parent_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join( "nested" ).join( "doc.json" );

        write_json( &target, &vec![ 1, 2, 3 ] ).unwrap();

        let raw = fs::read_to_string( &target ).unwrap();
        let parsed: Vec<i32> = serde_json::from_str( &raw ).unwrap();
        assert_eq!( parsed, vec![ 1, 2, 3 ] );
        assert!( !dir.path().join( "nested" ).join( "doc.json.tmp" ).exists() );
    }


    #[test]
    fn test_write_json_replaces_existing_document() {
        let dir = tempdir().unwrap();
        let target = dir.path().join( "doc.json" );

        write_json( &target, &"first" ).unwrap();
        write_json( &target, &"second" ).unwrap();

        let parsed: String = serde_json::from_str( &fs::read_to_string( &target ).unwrap() ).unwrap();
        assert_eq!( parsed, "second" );
    }
}
