//! Cadenza Core - Playlist and playback engine
//!
//! This crate provides the playlist model and its persistence, the playback
//! state machine, folder scanning, and an audio engine built on Symphonia
//! and cpal.

pub mod command;
pub mod engine;
pub mod library;
pub mod paths;
mod persist;
pub mod player;
pub mod playlist;
pub mod settings;
pub mod ticker;
pub mod track;

pub use command::{ Command, CommandError };
pub use engine::{ AudioEngine, DeviceEngine, EngineError };
pub use library::LibraryError;
pub use paths::AppPaths;
pub use player::{ PlaybackController, PlaybackState, PlayerError, PlayerEvent, TickOutcome };
pub use playlist::{ Playlist, PlaylistError };
pub use settings::{ Settings, SettingsError, SettingsStore };
pub use ticker::{ Ticker, TICK_PERIOD };
pub use track::Track;
