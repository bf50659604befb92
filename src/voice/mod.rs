pub mod registry;

pub use registry::{Notification, Voice, VoiceRegistry};
