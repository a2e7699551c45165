//! # Audio Module
//!
//! Playback for lag-music: queues, transcoding and the voice connection.
//!
//! ## Architecture
//!
//! ### [`player`] - Playback Controller
//! - One session per guild with its own event loop
//! - Track transitions, retries, autoplay and teardown
//!
//! ### [`queue`] - Queue Management
//! - Pending tracks, current track and bounded history
//! - Loop, shuffle and autoplay flags
//!
//! ### [`transcoder`] - Stream Transcoder
//! - One `ffmpeg` process per track producing s16le PCM
//! - Idempotent cleanup and a registry for shutdown
//!
//! ### [`voice`] - Songbird adapter
//! - Implements [`transport::VoiceTransport`] and [`transport::AudioSink`]
//! - Forwards driver and track events to the session loop
//!
//! ## Audio Quality
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Channels**: Stereo
//! - **Input**: 16-bit signed PCM, converted to f32 for songbird

pub mod notice;
pub mod player;
pub mod queue;
pub mod transcoder;
pub mod transport;
pub mod voice;
