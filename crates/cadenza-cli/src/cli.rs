//! Command-line argument parsing for Cadenza.

use std::path::PathBuf;

use clap::Parser;


/// Cadenza - A terminal playlist player.
#[derive( Parser, Debug )]
#[command( name = "cadenza" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Directory holding userdata.json and the playlists folder.
    #[arg( short, long, value_name = "DIR" )]
    pub data_dir: Option<PathBuf>,

    /// Playlist file to open instead of the last one used.
    #[arg( short, long, value_name = "PATH" )]
    pub playlist: Option<PathBuf>,

    /// Log at debug level.
    #[arg( short, long )]
    pub verbose: bool,

    /// Add files/directories to the playlist and start playing.
    #[arg( trailing_var_arg = true )]
    pub files: Vec<PathBuf>,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_full_command_line() {
        let args = Args::parse_from([ "cadenza", "-d", "/tmp/data", "--playlist", "road.playlist", "-v", "a.mp3", "music" ]);

        assert_eq!( args.data_dir, Some( PathBuf::from( "/tmp/data" ) ) );
        assert_eq!( args.playlist, Some( PathBuf::from( "road.playlist" ) ) );
        assert!( args.verbose );
        assert_eq!( args.files, vec![ PathBuf::from( "a.mp3" ), PathBuf::from( "music" ) ] );
    }


    #[test]
    fn test_defaults() {
        let args = Args::parse_from([ "cadenza" ]);
        assert!( args.data_dir.is_none() );
        assert!( !args.verbose );
        assert!( args.files.is_empty() );
    }
}
