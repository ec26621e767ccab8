//! Audio output via cpal

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };

use super::EngineError;


/// Queue of interleaved source samples shared between the decode thread
/// and the device callback.
pub( crate ) struct SampleQueue {
    samples: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    /// Volume stored as f32 bits
    volume: AtomicU32,
    source_channels: usize,
    output_channels: usize,
}


impl SampleQueue {
    pub fn new( capacity: usize, source_channels: usize, output_channels: usize ) -> Self {
        Self {
            samples: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( false ),
            volume: AtomicU32::new( 1.0_f32.to_bits() ),
            source_channels: source_channels.max( 1 ),
            output_channels: output_channels.max( 1 ),
        }
    }


    fn lock( &self ) -> MutexGuard<'_, VecDeque<f32>> {
        // A panicking holder cannot leave the deque half-updated
        self.samples.lock().unwrap_or_else( |poisoned| poisoned.into_inner() )
    }


    /// Appends as many samples as fit. Returns the number accepted.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut queue = self.lock();
        let room = self.capacity.saturating_sub( queue.len() );
        let accepted = samples.len().min( room );
        queue.extend( samples[ ..accepted ].iter().copied() );
        accepted
    }


    /// Fills a device buffer, converting channel layout and applying volume.
    /// Anything not covered by queued audio is silence.
    pub fn fill( &self, output: &mut [f32] ) {
        output.fill( 0.0 );
        if self.is_paused() {
            return;
        }

        let volume = self.volume();
        let src_ch = self.source_channels;
        let out_ch = self.output_channels;
        let mut queue = self.lock();

        let frames = ( output.len() / out_ch ).min( queue.len() / src_ch );
        let mut frame = vec![ 0.0_f32; src_ch ];

        for out_frame in output.chunks_exact_mut( out_ch ).take( frames ) {
            for slot in frame.iter_mut() {
                *slot = queue.pop_front().unwrap_or( 0.0 );
            }
            remix_frame( &frame, out_frame );
            for sample in out_frame.iter_mut() {
                *sample *= volume;
            }
        }
    }


    pub fn len( &self ) -> usize {
        self.lock().len()
    }


    pub fn is_empty( &self ) -> bool {
        self.lock().is_empty()
    }


    pub fn clear( &self ) {
        self.lock().clear();
    }


    pub fn set_paused( &self, paused: bool ) {
        self.paused.store( paused, Ordering::Relaxed );
    }


    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    pub fn set_volume( &self, volume: f32 ) {
        self.volume.store( volume.to_bits(), Ordering::Relaxed );
    }


    pub fn volume( &self ) -> f32 {
        f32::from_bits( self.volume.load( Ordering::Relaxed ) )
    }
}


/// Maps one source frame onto one output frame.
///
/// Mono output averages every source channel; otherwise channels map one to
/// one and missing output channels repeat the last source channel.
fn remix_frame( source: &[f32], output: &mut [f32] ) {
    if source.is_empty() {
        return;
    }

    if output.len() == 1 {
        output[ 0 ] = source.iter().sum::<f32>() / source.len() as f32;
        return;
    }

    let last = source[ source.len() - 1 ];
    for ( ch, out ) in output.iter_mut().enumerate() {
        *out = source.get( ch ).copied().unwrap_or( last );
    }
}


/// An open stream on the default output device.
///
/// Not Send: the cpal stream must stay on the thread that created it.
pub( crate ) struct OutputStream {
    stream: cpal::Stream,
    sample_rate: u32,
}


impl OutputStream {
    /// Opens the default device, preferring a config at the source rate.
    ///
    /// Returns the stream and the queue the decoder should feed.
    pub fn open( source_rate: u32, source_channels: usize ) -> Result<( Self, Arc<SampleQueue> ), EngineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else( || EngineError::Output( "no output device available".into() ) )?;

        tracing::info!( "Using output device: {:?}", device.name() );

        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| EngineError::Output( e.to_string() ) )?
            .collect();

        let rate_fits = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_rate && c.max_sample_rate().0 >= source_rate
        };

        let config = match supported.iter()
            .find( |c| rate_fits( *c ) && c.channels() as usize == source_channels )
            .or_else( || supported.iter().find( |c| rate_fits( *c ) ) )
        {
            Some( range ) => range.clone().with_sample_rate( cpal::SampleRate( source_rate ) ).config(),
            None => {
                let fallback = device
                    .default_output_config()
                    .map_err( |e| EngineError::Output( e.to_string() ) )?;
                tracing::info!(
                    "Device does not support {} Hz, resampling to {} Hz",
                    source_rate,
                    fallback.sample_rate().0
                );
                fallback.config()
            }
        };

        // About half a second of source audio
        let capacity = source_rate as usize * source_channels / 2;
        let queue = Arc::new( SampleQueue::new( capacity, source_channels, config.channels as usize ) );
        let callback_queue = Arc::clone( &queue );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback_queue.fill( data ),
                |err| tracing::error!( "Audio output error: {}", err ),
                None,
            )
            .map_err( |e| EngineError::Output( e.to_string() ) )?;

        stream.play().map_err( |e| EngineError::Output( e.to_string() ) )?;

        Ok(( Self { stream, sample_rate: config.sample_rate.0 }, queue ))
    }


    /// Sample rate the device runs at.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }
}


impl Drop for OutputStream {
    fn drop( &mut self ) {
        let _ = self.stream.pause();
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_remix_mono_to_stereo_duplicates() {
        let mut out = [ 0.0; 2 ];
        remix_frame( &[ 0.5 ], &mut out );
        assert_eq!( out, [ 0.5, 0.5 ] );
    }


    #[test]
    fn test_remix_stereo_to_mono_averages() {
        let mut out = [ 0.0; 1 ];
        remix_frame( &[ 0.2, 0.6 ], &mut out );
        assert!(( out[ 0 ] - 0.4 ).abs() < f32::EPSILON );
    }


    #[test]
    fn test_remix_stereo_to_surround_repeats_last() {
        let mut out = [ 0.0; 4 ];
        remix_frame( &[ 0.1, 0.2 ], &mut out );
        assert_eq!( out, [ 0.1, 0.2, 0.2, 0.2 ] );
    }


    #[test]
    fn test_queue_respects_capacity() {
        let queue = SampleQueue::new( 4, 2, 2 );
        assert_eq!( queue.push( &[ 1.0; 6 ] ), 4 );
        assert_eq!( queue.len(), 4 );
        assert_eq!( queue.push( &[ 1.0 ] ), 0 );
    }


    #[test]
    fn test_fill_applies_volume_and_pads_silence() {
        let queue = SampleQueue::new( 16, 2, 2 );
        queue.push( &[ 1.0, -1.0 ] );
        queue.set_volume( 0.5 );

        let mut out = [ 9.0; 4 ];
        queue.fill( &mut out );

        assert_eq!( out, [ 0.5, -0.5, 0.0, 0.0 ] );
        assert!( queue.is_empty() );
    }


    #[test]
    fn test_fill_outputs_silence_while_paused() {
        let queue = SampleQueue::new( 16, 1, 1 );
        queue.push( &[ 1.0, 1.0 ] );
        queue.set_paused( true );

        let mut out = [ 9.0; 2 ];
        queue.fill( &mut out );

        assert_eq!( out, [ 0.0, 0.0 ] );
        assert_eq!( queue.len(), 2 );
    }
}
