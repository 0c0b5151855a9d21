// Library root: configuration, wire protocol and the WebSocket server, so
// integration tests and the binary share one API.

pub mod config;
pub mod protocol;
pub mod ws_server;
