//! Packet decoding via Symphonia

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ CodecParameters, Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{ FormatOptions, FormatReader, SeekMode, SeekTo };
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use super::EngineError;


const FALLBACK_RATE: u32 = 44100;


/// Sample rate of a stream, falling back when the container reports none or zero.
fn stream_rate( params: &CodecParameters ) -> u32 {
    params.sample_rate.filter( |r| *r > 0 ).unwrap_or( FALLBACK_RATE )
}


/// Decoder for the first audio track of a file.
pub( crate ) struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration_ms: Option<u64>,
    sample_buf: Option<SampleBuffer<f32>>,
}


impl Decoder {
    /// Opens an audio file for decoding.
    pub fn open( path: &Path ) -> Result<Self, EngineError> {
        let file = File::open( path )?;
        let mss = MediaSourceStream::new( Box::new( file ), MediaSourceStreamOptions { buffer_len: 64 * 1024 } );

        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let probed = symphonia::default::get_probe()
            .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
            .map_err( |_| EngineError::UnsupportedFormat )?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( EngineError::NoAudioTrack )?;

        let track_id = track.id;
        let params = &track.codec_params;
        let sample_rate = stream_rate( params );
        let channels = params.channels.map( |c| c.count() ).unwrap_or( 2 );
        let duration_ms = params.n_frames.map( |frames| frames * 1000 / sample_rate as u64 );

        let decoder = symphonia::default::get_codecs()
            .make( params, &DecoderOptions::default() )
            .map_err( |e| EngineError::Decode( e.to_string() ) )?;

        tracing::info!(
            "Opened {:?}: {} Hz, {} channels, {:?} ms",
            path,
            sample_rate,
            channels,
            duration_ms
        );

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration_ms,
            sample_buf: None,
        })
    }


    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    pub fn channels( &self ) -> usize {
        self.channels
    }


    pub fn duration_ms( &self ) -> Option<u64> {
        self.duration_ms
    }


    /// Decodes the next packet into interleaved samples.
    ///
    /// Returns None at end of stream.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, EngineError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( SymphoniaError::IoError( ref e ) ) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok( None );
                }
                Err( e ) => return Err( EngineError::Decode( e.to_string() ) ),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                // Corrupt packets are skipped
                Err( SymphoniaError::DecodeError( _ ) ) => continue,
                Err( e ) => return Err( EngineError::Decode( e.to_string() ) ),
            };

            let frames = decoded.capacity();
            let spec = *decoded.spec();
            let too_small = self.sample_buf.as_ref()
                .map_or( true, |buf| buf.capacity() < frames * spec.channels.count() );
            if too_small {
                self.sample_buf = Some( SampleBuffer::new( frames as u64, spec ) );
            }

            if let Some( ref mut buf ) = self.sample_buf {
                buf.copy_interleaved_ref( decoded );
                return Ok( Some( buf.samples().to_vec() ) );
            }
        }
    }


    /// Seeks to a position in milliseconds.
    pub fn seek( &mut self, position_ms: u64 ) -> Result<(), EngineError> {
        let seek_to = SeekTo::Time {
            time: Time::from( position_ms as f64 / 1000.0 ),
            track_id: Some( self.track_id ),
        };

        self.format_reader
            .seek( SeekMode::Accurate, seek_to )
            .map_err( |e| EngineError::Decode( e.to_string() ) )?;
        self.decoder.reset();

        Ok(())
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_stream_rate_ignores_zero() {
        let mut params = CodecParameters::new();
        assert_eq!( stream_rate( &params ), FALLBACK_RATE );

        params.with_sample_rate( 0 );
        assert_eq!( stream_rate( &params ), FALLBACK_RATE );

        params.with_sample_rate( 48000 );
        assert_eq!( stream_rate( &params ), 48000 );
    }


    #[test]
    fn test_open_missing_file_fails() {
        assert!( Decoder::open( Path::new( "/nonexistent/cadenza/track.wav" ) ).is_err() );
    }
}
