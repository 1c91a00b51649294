//! IPC codec and wire protocol between the daemon and its clients.

pub mod codec;
pub mod protocol;
