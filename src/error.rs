use crate::processor::Processor;
use std::fmt;
use thiserror::Error;

/// Why a processor declined to prepare for streaming.
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("unsupported channel layout: {inputs} in / {outputs} out")]
    UnsupportedLayout { inputs: usize, outputs: usize },
    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(f64),
    #[error("{0}")]
    Other(String),
}

/// Returned by a processor swap when the incoming processor failed to
/// prepare. The previously active processor stays in place; the rejected
/// one is handed back to the caller untouched.
pub struct SetProcessorError {
    pub processor: Box<dyn Processor>,
    pub source: PrepareError,
}

impl fmt::Debug for SetProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetProcessorError")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for SetProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "processor rejected during swap: {}", self.source)
    }
}

impl std::error::Error for SetProcessorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Failures building or starting the cpal streams.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

/// Failures opening hardware MIDI input ports.
#[derive(Debug, Error)]
pub enum MidiConnectError {
    #[error("failed to initialise MIDI input: {0}")]
    Init(#[from] midir::InitError),
    #[error("failed to connect to MIDI input port: {0}")]
    Connect(String),
}
