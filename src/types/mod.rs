pub mod command;
pub mod device;
pub mod note;
pub mod waveform;
