//! Slash command parsing.
//!
//! Commands are typed in the terminal after a leading `/` and map onto
//! [`crate::PlaybackController`] operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;


/// Errors that can occur during command parsing.
#[derive( Debug, Error, PartialEq )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed slash command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Playlist commands
    Add { path: PathBuf },
    New { name: String },
    Open { path: PathBuf },
    Remove,

    // Playback commands
    Play { index: Option<usize> },
    Pause,
    Stop,
    Next,
    Prev,
    Seek { position: Duration },

    // Other
    Volume { level: Option<u8> },
    Help,
    Quit,
}


/// Returns the argument or reports which one is missing.
fn required<'a>( args: Option<&'a str>, what: &str ) -> Result<&'a str, CommandError> {
    args.ok_or_else( || CommandError::MissingArgument( what.to_string() ) )
}


fn invalid( msg: String ) -> CommandError {
    CommandError::InvalidArgument( msg )
}


impl Command {
    /// Parses a command string (without the leading `/`).
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let ( cmd, args ) = match input.trim().split_once( char::is_whitespace ) {
            Some(( cmd, rest )) => ( cmd, Some( rest.trim() ).filter( |r| !r.is_empty() ) ),
            None => ( input.trim(), None ),
        };

        let command = match cmd.to_lowercase().as_str() {
            "add" | "a" => Command::Add { path: PathBuf::from( required( args, "path" )? ) },
            "new" => {
                let name = required( args, "playlist name" )?;
                if name.contains( [ '/', '\\' ] ) {
                    return Err( invalid( format!( "Playlist name cannot contain a path separator: {}", name ) ) );
                }
                Command::New { name: name.to_string() }
            }
            "open" | "o" => Command::Open { path: PathBuf::from( required( args, "playlist path" )? ) },
            "remove" | "rm" | "del" => Command::Remove,

            // Track numbers are 1-based on the command line
            "play" | "p" => match args {
                None => Command::Play { index: None },
                Some( n ) => match n.parse::<usize>() {
                    Ok( number ) if number > 0 => Command::Play { index: Some( number - 1 ) },
                    _ => return Err( invalid( format!( "Invalid track number: {}", n ) ) ),
                },
            },
            "pause" | "pa" => Command::Pause,
            "stop" | "st" => Command::Stop,
            "next" | "n" => Command::Next,
            "prev" | "previous" | "pr" => Command::Prev,
            "seek" | "sk" => Command::Seek { position: parse_time( required( args, "time position" )? )? },

            "vol" | "volume" => match args {
                None => Command::Volume { level: None },
                Some( v ) => match v.parse::<u8>() {
                    Ok( level ) if level <= 100 => Command::Volume { level: Some( level ) },
                    _ => return Err( invalid( format!( "Volume must be 0-100: {}", v ) ) ),
                },
            },
            "help" | "h" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,

            "" => return Err( CommandError::Unknown( "empty command".into() ) ),
            other => return Err( CommandError::Unknown( other.to_string() ) ),
        };

        Ok( command )
    }
}


/// Parses `M:SS` or plain seconds.
fn parse_time( s: &str ) -> Result<Duration, CommandError> {
    let s = s.trim();
    let seconds = match s.split_once( ':' ) {
        Some(( min, sec )) => {
            let minutes = min.parse::<u64>().map_err( |_| invalid( format!( "Invalid minutes: {}", min ) ) )?;
            let seconds = match sec.parse::<u64>() {
                Ok( secs ) if secs < 60 && sec.len() == 2 => secs,
                _ => return Err( invalid( format!( "Invalid seconds: {}", sec ) ) ),
            };
            minutes.checked_mul( 60 )
                .and_then( |m| m.checked_add( seconds ) )
                .ok_or_else( || invalid( format!( "Time out of range: {}", s ) ) )?
        }
        None => s.parse::<u64>().map_err( |_| invalid( format!( "Invalid time: {}", s ) ) )?,
    };
    Ok( Duration::from_secs( seconds ) )
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Playlist Commands:
  /add <path>     Add file or folder         [a]
  /new <name>     Create/switch playlist
  /open <path>    Open playlist file
  /remove         Remove selected track      [x]

Playback Commands:
  /play [n]       Play (track n)             [Enter]
  /pause          Toggle pause               [Space]
  /stop           Stop playback              [s]
  /next           Next track                 [n]
  /prev           Previous track             [p]
  /seek <time>    Seek (e.g. 1:30)           [Left/Right]

Other Commands:
  /vol [0-100]    Set volume                 [+/-]
  /help           Show this help             [?]
  /quit           Exit cadenza               [q]"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_add() {
        let cmd = Command::parse( "add /path/to/file.mp3" ).unwrap();
        assert_eq!( cmd, Command::Add { path: PathBuf::from( "/path/to/file.mp3" ) } );
    }


    #[test]
    fn test_parse_add_keeps_spaces_in_path() {
        let cmd = Command::parse( "a   /music/Best Of  " ).unwrap();
        assert_eq!( cmd, Command::Add { path: PathBuf::from( "/music/Best Of" ) } );
    }


    #[test]
    fn test_parse_new() {
        assert_eq!( Command::parse( "new party" ).unwrap(), Command::New { name: "party".into() } );
        assert!( matches!( Command::parse( "new a/b" ), Err( CommandError::InvalidArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "new   " ), Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_open() {
        let cmd = Command::parse( "open playlists/road.playlist" ).unwrap();
        assert_eq!( cmd, Command::Open { path: PathBuf::from( "playlists/road.playlist" ) } );
    }


    #[test]
    fn test_parse_play_is_one_based() {
        assert_eq!( Command::parse( "play" ).unwrap(), Command::Play { index: None } );
        assert_eq!( Command::parse( "p 3" ).unwrap(), Command::Play { index: Some( 2 ) } );
        assert!( matches!( Command::parse( "play 0" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_seek() {
        let cmd = Command::parse( "seek 1:30" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 90 ) } );
    }


    #[test]
    fn test_parse_seek_seconds() {
        let cmd = Command::parse( "seek 45" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 45 ) } );
    }


    #[test]
    fn test_parse_seek_rejects_bad_seconds() {
        assert!( matches!( Command::parse( "seek 1:75" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_seek_rejects_huge_minutes() {
        let result = Command::parse( "seek 307445734561825861:00" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_volume() {
        assert_eq!( Command::parse( "vol 40" ).unwrap(), Command::Volume { level: Some( 40 ) } );
        assert_eq!( Command::parse( "volume" ).unwrap(), Command::Volume { level: None } );
        assert!( matches!( Command::parse( "vol 101" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!( Command::parse( "NEXT" ).unwrap(), Command::Next );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        let result = Command::parse( "add" );
        assert!( matches!( result, Err( CommandError::MissingArgument( _ ) ) ) );
    }
}
