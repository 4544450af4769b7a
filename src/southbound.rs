//! Southbound command shapes and the transport that carries them to switches.

pub mod transport;
pub mod types;
