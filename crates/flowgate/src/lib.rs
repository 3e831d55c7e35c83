//! Flowgate: a WebSocket gateway between browser chat clients and an
//! assistant backend.
//!
//! Browsers connect to `/ws/{client_id}` and exchange JSON frames (see
//! [`flowgate_protocol`]). Chat turns are relayed to a remote agent when
//! one is configured, otherwise the gateway streams a simulated reply.

pub mod api;
pub mod backend;
pub mod config;
pub mod ws;
