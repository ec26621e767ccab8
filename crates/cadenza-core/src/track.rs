//! Track metadata via Symphonia
//!
//! Reads display and playback metadata from an audio file. Missing files,
//! unknown containers and absent tags all degrade to default values.

use std::fs::{ self, File };
use std::path::{ Path, PathBuf };

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{ MetadataOptions, MetadataRevision, StandardTagKey, StandardVisualKey };
use symphonia::core::probe::Hint;


/// Title and artist shown when a file carries no tag for them.
pub const UNKNOWN: &str = "Unknown";

/// Asset the presentation layer shows when a track has no cover art.
pub const PLACEHOLDER_COVER: &str = "no-photo.png";


/// Cover art for display.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Cover<'a> {
    /// Image bytes embedded in the file.
    Embedded( &'a [u8] ),
    /// Path of the placeholder asset.
    Placeholder( &'static str ),
}


/// One playable file plus the metadata derived from it.
///
/// Two tracks are equal when they refer to the same path.
#[derive( Debug, Clone )]
pub struct Track {
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub length_seconds: f64,
    pub bitrate_bps: u32,
    pub cover_image: Option<Vec<u8>>,
}


impl PartialEq for Track {
    fn eq( &self, other: &Self ) -> bool {
        self.path == other.path
    }
}


impl Eq for Track {}


/// Tag values collected from one or more metadata revisions.
#[derive( Debug, Default )]
struct Tags {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    cover: Option<Vec<u8>>,
}


impl Tags {
    /// Fills fields that are still empty from a revision.
    fn absorb( &mut self, revision: &MetadataRevision ) {
        for tag in revision.tags() {
            let slot = match tag.std_key {
                Some( StandardTagKey::TrackTitle ) => &mut self.title,
                Some( StandardTagKey::Artist ) => &mut self.artist,
                Some( StandardTagKey::Album ) => &mut self.album,
                _ => continue,
            };
            if slot.is_none() {
                let value = tag.value.to_string();
                let value = value.trim_matches( |c: char| c.is_whitespace() || c == '\0' );
                if !value.is_empty() {
                    *slot = Some( value.to_string() );
                }
            }
        }

        if self.cover.is_none() {
            let visuals = revision.visuals();
            let front = visuals.iter()
                .find( |v| v.usage == Some( StandardVisualKey::FrontCover ) )
                .or_else( || visuals.first() );
            self.cover = front.map( |v| v.data.to_vec() );
        }
    }
}


impl Track {
    /// A track with every metadata field at its default.
    pub fn unknown( path: impl Into<PathBuf> ) -> Self {
        Self {
            path: path.into(),
            title: UNKNOWN.to_string(),
            artist: UNKNOWN.to_string(),
            album: None,
            length_seconds: 0.0,
            bitrate_bps: 0,
            cover_image: None,
        }
    }


    /// Reads metadata for the file at `path`.
    ///
    /// Never fails: anything that cannot be read keeps its default value.
    pub fn from_path( path: &Path ) -> Self {
        let mut track = Self::unknown( path );

        let file = match File::open( path ) {
            Ok( f ) => f,
            Err( e ) => {
                tracing::debug!( "No metadata for {:?}: {}", path, e );
                return track;
            }
        };

        let mss = MediaSourceStream::new( Box::new( file ), Default::default() );
        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let mut probed = match symphonia::default::get_probe()
            .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
        {
            Ok( p ) => p,
            Err( e ) => {
                tracing::debug!( "Unrecognized container {:?}: {}", path, e );
                return track;
            }
        };

        let mut tags = Tags::default();
        // Container-level tags (ID3 and friends) first, then stream tags
        if let Some( log ) = probed.metadata.get() {
            if let Some( revision ) = log.current() {
                tags.absorb( revision );
            }
        }
        if let Some( revision ) = probed.format.metadata().current() {
            tags.absorb( revision );
        }

        if let Some( title ) = tags.title {
            track.title = title;
        }
        if let Some( artist ) = tags.artist {
            track.artist = artist;
        }
        track.album = tags.album;
        track.cover_image = tags.cover;

        let params = probed.format.tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .map( |t| &t.codec_params );

        if let Some( params ) = params {
            if let ( Some( frames ), Some( rate ) ) = ( params.n_frames, params.sample_rate ) {
                if rate > 0 {
                    track.length_seconds = frames as f64 / rate as f64;
                }
            }
        }

        let size = fs::metadata( path ).map( |m| m.len() ).unwrap_or( 0 );
        track.bitrate_bps = average_bitrate( size, track.length_seconds );

        track
    }


    /// Embedded cover art, or the placeholder asset when there is none.
    pub fn cover_image_or_placeholder( &self ) -> Cover<'_> {
        match self.cover_image.as_deref() {
            Some( bytes ) if !bytes.is_empty() => Cover::Embedded( bytes ),
            _ => Cover::Placeholder( PLACEHOLDER_COVER ),
        }
    }


    /// Title line for display, prefixed with the album when known.
    pub fn display_title( &self ) -> String {
        match self.album {
            Some( ref album ) => format!( "{} - {}", album, self.title ),
            None => self.title.clone(),
        }
    }


    /// File name used when listing the track.
    pub fn file_name( &self ) -> String {
        self.path.file_name()
            .map( |n| n.to_string_lossy().into_owned() )
            .unwrap_or_else( || self.path.display().to_string() )
    }
}


/// Average bitrate in bits per second from file size and length.
fn average_bitrate( size_bytes: u64, length_seconds: f64 ) -> u32 {
    if length_seconds <= 0.0 {
        return 0;
    }
    let bps = ( size_bytes as f64 * 8.0 ) / length_seconds;
    bps.round().min( u32::MAX as f64 ) as u32
}


#[cfg( test )]
mod tests {
    use super::*;
    use tempfile::tempdir;


    #[test]
    fn test_missing_file_degrades_to_defaults() {
        let track = Track::from_path( Path::new( "/definitely/not/here.mp3" ) );
        assert_eq!( track, Track::unknown( "/definitely/not/here.mp3" ) );
        assert_eq!( track.title, UNKNOWN );
        assert_eq!( track.artist, UNKNOWN );
    }


    #[test]
    fn test_garbage_file_degrades_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join( "noise.mp3" );
        fs::write( &path, b"this is not audio at all" ).unwrap();

        let track = Track::from_path( &path );
        assert_eq!( track.title, UNKNOWN );
        assert_eq!( track.length_seconds, 0.0 );
        assert_eq!( track.bitrate_bps, 0 );
        assert!( track.cover_image.is_none() );
    }


    /// Writes a silent 16-bit mono PCM WAV, optionally with a RIFF INFO title.
    fn write_wav( path: &Path, rate: u32, frames: u32, title: Option<&str> ) {
        let data_len = frames * 2;
        let mut list = Vec::new();
        if let Some( title ) = title {
            let mut name = title.as_bytes().to_vec();
            if name.len() % 2 == 1 {
                name.push( 0 );
            }
            list.extend_from_slice( b"LIST" );
            list.extend_from_slice( &( 4 + 8 + name.len() as u32 ).to_le_bytes() );
            list.extend_from_slice( b"INFO" );
            list.extend_from_slice( b"INAM" );
            list.extend_from_slice( &( name.len() as u32 ).to_le_bytes() );
            list.extend_from_slice( &name );
        }

        let mut wav = Vec::new();
        wav.extend_from_slice( b"RIFF" );
        wav.extend_from_slice( &( 4 + 24 + list.len() as u32 + 8 + data_len ).to_le_bytes() );
        wav.extend_from_slice( b"WAVE" );
        wav.extend_from_slice( b"fmt " );
        wav.extend_from_slice( &16u32.to_le_bytes() );
        wav.extend_from_slice( &1u16.to_le_bytes() );
        wav.extend_from_slice( &1u16.to_le_bytes() );
        wav.extend_from_slice( &rate.to_le_bytes() );
        wav.extend_from_slice( &( rate * 2 ).to_le_bytes() );
        wav.extend_from_slice( &2u16.to_le_bytes() );
        wav.extend_from_slice( &16u16.to_le_bytes() );
        wav.extend_from_slice( &list );
        wav.extend_from_slice( b"data" );
        wav.extend_from_slice( &data_len.to_le_bytes() );
        wav.resize( wav.len() + data_len as usize, 0 );

        fs::write( path, wav ).unwrap();
    }


    #[test]
    fn test_wav_length_and_bitrate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join( "tone.wav" );
        write_wav( &path, 8000, 16_000, None );

        let track = Track::from_path( &path );

        assert_eq!( track.length_seconds, 2.0 );
        let size = fs::metadata( &path ).unwrap().len();
        assert_eq!( track.bitrate_bps, average_bitrate( size, 2.0 ) );
        assert!( track.bitrate_bps > 128_000 );
        assert_eq!( track.title, UNKNOWN );
        assert_eq!( track.artist, UNKNOWN );
    }


    #[test]
    fn test_wav_info_title() {
        let dir = tempdir().unwrap();
        let path = dir.path().join( "named.wav" );
        write_wav( &path, 8000, 8000, Some( "Song" ) );

        let track = Track::from_path( &path );

        assert_eq!( track.title, "Song" );
        assert_eq!( track.length_seconds, 1.0 );
    }


    #[test]
    fn test_equality_is_by_path() {
        let mut renamed = Track::unknown( "a.mp3" );
        renamed.title = "Other".into();
        renamed.length_seconds = 12.5;

        assert_eq!( renamed, Track::unknown( "a.mp3" ) );
        assert_ne!( renamed, Track::unknown( "b.mp3" ) );
    }


    #[test]
    fn test_cover_falls_back_to_placeholder() {
        let mut track = Track::unknown( "a.mp3" );
        assert_eq!( track.cover_image_or_placeholder(), Cover::Placeholder( PLACEHOLDER_COVER ) );

        track.cover_image = Some( vec![ 0xff, 0xd8 ] );
        assert_eq!( track.cover_image_or_placeholder(), Cover::Embedded( &[ 0xff, 0xd8 ] ) );
    }


    #[test]
    fn test_display_title_includes_album() {
        let mut track = Track::unknown( "a.mp3" );
        track.title = "Song".into();
        assert_eq!( track.display_title(), "Song" );

        track.album = Some( "Record".into() );
        assert_eq!( track.display_title(), "Record - Song" );
    }


    #[test]
    fn test_average_bitrate() {
        assert_eq!( average_bitrate( 1_000_000, 0.0 ), 0 );
        assert_eq!( average_bitrate( 40_000, 2.0 ), 160_000 );
    }
}
