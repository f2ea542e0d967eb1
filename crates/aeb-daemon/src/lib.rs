//! Library surface of aeb-daemon, split out so the scenario tests in
//! `tests/` can compose the router and state without a TCP socket.

pub mod api_types;
pub mod routes;
pub mod state;
