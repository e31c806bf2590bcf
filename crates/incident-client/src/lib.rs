//! Network boundary for the incident board: the REST backend client, the
//! WebSocket push channel, process logging and the `incident-watch` binary.

pub mod http;
pub mod logging;
pub mod watch;
pub mod ws;

pub use http::HttpIncidentApi;
pub use ws::WsPushSource;

pub fn crate_label() -> &'static str {
    "incident-client"
}
