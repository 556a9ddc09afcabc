//! Event types fanned out to the presentation layer.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a host can
//! forward them over whatever bridge it uses (IPC bus, WebSocket, …).

pub mod events;
