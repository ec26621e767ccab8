//! Audio engine contract
//!
//! The playback controller drives audio through the narrow [`AudioEngine`]
//! trait. [`DeviceEngine`] implements it on top of Symphonia, rubato and the
//! default cpal output device.

mod decoder;
mod device;
mod output;

use std::path::Path;

use thiserror::Error;

pub use device::DeviceEngine;


/// Errors reported by an audio engine.
#[derive( Debug, Error )]
pub enum EngineError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Audio output error: {0}" )]
    Output( String ),

    #[error( "No track loaded" )]
    NotLoaded,
}


/// Operations the controller needs from an audio engine.
///
/// Positions and durations are in milliseconds; volume is `0.0..=1.0`.
pub trait AudioEngine {
    /// Opens `path` and makes it the loaded track, replacing any previous
    /// one. Playback does not start until [`AudioEngine::play`].
    fn load( &mut self, path: &Path ) -> Result<(), EngineError>;

    /// Starts the loaded track, or resumes it if it is already running.
    fn play( &mut self ) -> Result<(), EngineError>;

    fn pause( &mut self );

    fn unpause( &mut self );

    /// Stops playback and unloads the track.
    fn stop( &mut self );

    fn set_volume( &mut self, volume: f32 );

    /// Moves the playhead of the loaded track.
    fn seek( &mut self, position_ms: u64 ) -> Result<(), EngineError>;

    /// Playhead position of the loaded track.
    fn current_position( &self ) -> u64;

    /// Total length of the loaded track, if known.
    fn duration( &self ) -> Option<u64>;

    /// False once the running stream reached its end, or when nothing runs.
    fn is_stream_active( &self ) -> bool;
}
