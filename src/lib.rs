//! Resident voice-cloning speech worker.
//!
//! Reads JSON requests line by line, normalizes and chunks the text,
//! synthesizes each chunk with a cached provider, stitches the audio with
//! pauses and optionally writes subtitles.

pub mod args;
pub mod audio;
pub mod cache;
pub mod config;
pub mod daemon;
pub mod device;
pub mod error;
pub mod orchestrator;
pub mod processor;
pub mod provider;
pub mod report;
pub mod request;
pub mod subtitle;
pub mod text;

pub use error::{Result, WorkerError};
