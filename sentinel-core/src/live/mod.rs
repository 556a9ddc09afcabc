//! Live duplex voice session: continuous microphone uplink and gapless
//! playback of synthesized responses over one realtime channel.

pub mod session;

pub use session::{LiveConfig, LiveSession};
