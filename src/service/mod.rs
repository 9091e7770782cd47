pub mod client;
pub mod protocol;
pub mod server;
pub mod session;

pub use client::ServiceClient;
pub use protocol::{AccessDenial, Request, Response, MAX_FRAME_BYTES};
pub use server::{handle_request, serve_connection, ServiceState};
pub use session::SessionManager;
