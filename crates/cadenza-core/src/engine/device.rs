//! Engine backed by the default output device
//!
//! A decode thread feeds a [`SampleQueue`] that the cpal callback drains.
//! When the device cannot run at the file's rate, rubato converts it.

use std::path::{ Path, PathBuf };
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };

use super::decoder::Decoder;
use super::output::{ OutputStream, SampleQueue };
use super::{ AudioEngine, EngineError };


/// Converts planar samples to interleaved format.
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    let frames = channels.first().map( Vec::len ).unwrap_or( 0 );
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


/// Sample rate conversion between the decoder and the device.
struct RateConverter {
    resampler: FastFixedOut<f32>,
    /// Planar input waiting for a full resampler chunk
    pending: Vec<Vec<f32>>,
}


impl RateConverter {
    fn new( from: u32, to: u32, channels: usize ) -> Result<Self, EngineError> {
        let resampler = FastFixedOut::<f32>::new(
            to as f64 / from as f64,
            2.0,
            PolynomialDegree::Cubic,
            1024,
            channels,
        ).map_err( |e| EngineError::Output( format!( "Failed to create resampler: {}", e ) ) )?;

        Ok( Self { resampler, pending: vec![ Vec::new(); channels ] } )
    }


    /// Accepts interleaved input and returns whatever interleaved output
    /// full chunks produced.
    fn process( &mut self, samples: &[f32] ) -> Vec<f32> {
        let channels = self.pending.len();
        for frame in samples.chunks_exact( channels ) {
            for ( ch, sample ) in frame.iter().enumerate() {
                self.pending[ ch ].push( *sample );
            }
        }

        let mut out = Vec::new();
        while self.pending[ 0 ].len() >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = self.pending
                .iter_mut()
                .map( |ch| ch.drain( ..needed ).collect() )
                .collect();

            match self.resampler.process( &chunk, None ) {
                Ok( resampled ) => out.extend( interleave( &resampled ) ),
                Err( e ) => {
                    tracing::error!( "Resample error: {}", e );
                    break;
                }
            }
        }
        out
    }


    /// Converts the remaining partial chunk at end of stream.
    fn flush( &mut self ) -> Vec<f32> {
        if self.pending[ 0 ].is_empty() {
            return Vec::new();
        }
        let channels = self.pending.len();
        let rest = std::mem::replace( &mut self.pending, vec![ Vec::new(); channels ] );
        match self.resampler.process_partial( Some( rest.as_slice() ), None ) {
            Ok( resampled ) => interleave( &resampled ),
            Err( e ) => {
                tracing::error!( "Final resample error: {}", e );
                Vec::new()
            }
        }
    }
}


/// State shared with the decode thread.
struct Shared {
    queue: Arc<SampleQueue>,
    stop: AtomicBool,
    /// Source frames handed to the queue, including the seek offset
    frames: AtomicU64,
    finished: AtomicBool,
}


impl Shared {
    /// Pushes everything unless asked to stop.
    fn push_all( &self, samples: &[f32] ) {
        let mut offset = 0;
        while offset < samples.len() && !self.stop.load( Ordering::Relaxed ) {
            let pushed = self.queue.push( &samples[ offset.. ] );
            offset += pushed;
            if pushed == 0 {
                thread::sleep( Duration::from_millis( 5 ) );
            }
        }
    }
}


/// A running stream: output device plus decode thread.
struct Session {
    shared: Arc<Shared>,
    sample_rate: u32,
    thread: Option<thread::JoinHandle<()>>,
    _output: OutputStream,
}


impl Session {
    fn start( mut decoder: Decoder, start_ms: u64, volume: f32, paused: bool ) -> Result<Self, EngineError> {
        let source_rate = decoder.sample_rate();
        let channels = decoder.channels();

        let ( output, queue ) = OutputStream::open( source_rate, channels )?;
        queue.set_volume( volume );
        queue.set_paused( paused );

        let mut converter = if output.sample_rate() != source_rate {
            tracing::info!( "Resampling: {} Hz -> {} Hz", source_rate, output.sample_rate() );
            Some( RateConverter::new( source_rate, output.sample_rate(), channels )? )
        } else {
            None
        };

        let shared = Arc::new( Shared {
            queue,
            stop: AtomicBool::new( false ),
            frames: AtomicU64::new( start_ms * source_rate as u64 / 1000 ),
            finished: AtomicBool::new( false ),
        });

        let worker = Arc::clone( &shared );
        let thread = thread::spawn( move || {
            // Keep about 50ms decoded ahead of the device
            let high_water = source_rate as usize * channels / 20;

            loop {
                if worker.stop.load( Ordering::Relaxed ) {
                    break;
                }
                if worker.queue.is_paused() || worker.queue.len() > high_water {
                    thread::sleep( Duration::from_millis( 5 ) );
                    continue;
                }

                match decoder.decode_next() {
                    Ok( Some( samples ) ) => {
                        worker.frames.fetch_add( ( samples.len() / channels ) as u64, Ordering::Relaxed );
                        match converter {
                            Some( ref mut c ) => worker.push_all( &c.process( &samples ) ),
                            None => worker.push_all( &samples ),
                        }
                    }
                    Ok( None ) => {
                        if let Some( ref mut c ) = converter {
                            worker.push_all( &c.flush() );
                        }
                        while !worker.queue.is_empty() && !worker.stop.load( Ordering::Relaxed ) {
                            thread::sleep( Duration::from_millis( 10 ) );
                        }
                        tracing::debug!( "Decode thread: end of stream" );
                        break;
                    }
                    Err( e ) => {
                        tracing::error!( "Decode error: {}", e );
                        break;
                    }
                }
            }

            worker.finished.store( true, Ordering::Relaxed );
        });

        Ok( Self {
            shared,
            sample_rate: source_rate,
            thread: Some( thread ),
            _output: output,
        })
    }


    fn position_ms( &self ) -> u64 {
        self.shared.frames.load( Ordering::Relaxed ) * 1000 / self.sample_rate.max( 1 ) as u64
    }
}


impl Drop for Session {
    fn drop( &mut self ) {
        self.shared.stop.store( true, Ordering::Relaxed );
        self.shared.queue.clear();
        if let Some( thread ) = self.thread.take() {
            let _ = thread.join();
        }
    }
}


/// The track currently held by the engine.
struct Loaded {
    path: PathBuf,
    duration_ms: Option<u64>,
    /// Playhead before a session exists
    start_ms: u64,
    /// Decoder opened ahead of the first `play`
    decoder: Option<Decoder>,
    session: Option<Session>,
}


/// [`AudioEngine`] that plays through the default output device.
///
/// Not Send: the device stream must stay on the thread that created it.
pub struct DeviceEngine {
    volume: f32,
    loaded: Option<Loaded>,
}


impl DeviceEngine {
    pub fn new() -> Self {
        Self { volume: 1.0, loaded: None }
    }
}


impl Default for DeviceEngine {
    fn default() -> Self {
        Self::new()
    }
}


impl AudioEngine for DeviceEngine {
    fn load( &mut self, path: &Path ) -> Result<(), EngineError> {
        self.stop();

        let decoder = Decoder::open( path )?;
        self.loaded = Some( Loaded {
            path: path.to_path_buf(),
            duration_ms: decoder.duration_ms(),
            start_ms: 0,
            decoder: Some( decoder ),
            session: None,
        });
        Ok(())
    }


    fn play( &mut self ) -> Result<(), EngineError> {
        let volume = self.volume;
        let loaded = self.loaded.as_mut().ok_or( EngineError::NotLoaded )?;

        if let Some( ref session ) = loaded.session {
            session.shared.queue.set_paused( false );
            return Ok(());
        }

        let decoder = match loaded.decoder.take() {
            Some( d ) => d,
            None => {
                let mut d = Decoder::open( &loaded.path )?;
                d.seek( loaded.start_ms )?;
                d
            }
        };

        tracing::info!( "Playing: {:?}", loaded.path );
        loaded.session = Some( Session::start( decoder, loaded.start_ms, volume, false )? );
        Ok(())
    }


    fn pause( &mut self ) {
        if let Some( session ) = self.loaded.as_ref().and_then( |l| l.session.as_ref() ) {
            session.shared.queue.set_paused( true );
        }
    }


    fn unpause( &mut self ) {
        if let Some( session ) = self.loaded.as_ref().and_then( |l| l.session.as_ref() ) {
            session.shared.queue.set_paused( false );
        }
    }


    fn stop( &mut self ) {
        if let Some( loaded ) = self.loaded.take() {
            // Dropping the session joins the decode thread and closes the stream
            drop( loaded );
            tracing::info!( "Stopped" );
        }
    }


    fn set_volume( &mut self, volume: f32 ) {
        self.volume = volume.clamp( 0.0, 1.0 );
        if let Some( session ) = self.loaded.as_ref().and_then( |l| l.session.as_ref() ) {
            session.shared.queue.set_volume( self.volume );
        }
    }


    fn seek( &mut self, position_ms: u64 ) -> Result<(), EngineError> {
        let volume = self.volume;
        let loaded = self.loaded.as_mut().ok_or( EngineError::NotLoaded )?;

        tracing::info!( "Seeking to {} ms in {:?}", position_ms, loaded.path );

        let mut decoder = Decoder::open( &loaded.path )?;
        decoder.seek( position_ms )?;
        loaded.start_ms = position_ms;

        match loaded.session.take() {
            Some( old ) => {
                let paused = old.shared.queue.is_paused();
                drop( old );
                loaded.session = Some( Session::start( decoder, position_ms, volume, paused )? );
            }
            None => loaded.decoder = Some( decoder ),
        }
        Ok(())
    }


    fn current_position( &self ) -> u64 {
        match self.loaded {
            Some( Loaded { session: Some( ref s ), .. } ) => s.position_ms(),
            Some( ref l ) => l.start_ms,
            None => 0,
        }
    }


    fn duration( &self ) -> Option<u64> {
        self.loaded.as_ref().and_then( |l| l.duration_ms )
    }


    fn is_stream_active( &self ) -> bool {
        self.loaded.as_ref()
            .and_then( |l| l.session.as_ref() )
            .map( |s| !s.shared.finished.load( Ordering::Relaxed ) )
            .unwrap_or( false )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_interleave() {
        let planar = vec![ vec![ 1.0, 2.0 ], vec![ 10.0, 20.0 ] ];
        assert_eq!( interleave( &planar ), vec![ 1.0, 10.0, 2.0, 20.0 ] );
        assert!( interleave( &[] ).is_empty() );
    }


    #[test]
    fn test_fresh_engine_has_nothing_loaded() {
        let mut engine = DeviceEngine::new();
        assert!( !engine.is_stream_active() );
        assert_eq!( engine.current_position(), 0 );
        assert!( matches!( engine.play(), Err( EngineError::NotLoaded ) ) );
        assert!( matches!( engine.seek( 1000 ), Err( EngineError::NotLoaded ) ) );
    }


    #[test]
    fn test_load_missing_file_fails_without_panicking() {
        let mut engine = DeviceEngine::new();
        let result = engine.load( Path::new( "/no/such/track.mp3" ) );
        assert!( matches!( result, Err( EngineError::FileOpen( _ ) ) ) );
        assert!( !engine.is_stream_active() );
    }


    #[test]
    fn test_rate_converter_flushes_partial_chunk() {
        let mut converter = RateConverter::new( 22050, 44100, 2 ).unwrap();
        let out = converter.process( &[ 0.0; 64 ] );
        let tail = converter.flush();
        assert_eq!( ( out.len() + tail.len() ) % 2, 0 );
        assert!( !tail.is_empty() );
    }
}
