pub mod backend_client;
pub mod session_listener;

pub use backend_client::BackendClient;
pub use session_listener::SessionListener;
