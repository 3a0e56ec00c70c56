pub mod adapter;
pub mod collector;
pub mod convert;
pub mod device;
pub mod error;
pub mod midi;
pub mod midi_input;
pub mod player;
pub mod processor;
pub mod slot;

/// Upper bound on the number of samples per channel a device callback will
/// ever be handed.
pub const MAX_BLOCK_SIZE: usize = 2048;
