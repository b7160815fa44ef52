pub mod backend;
pub mod cache;

pub use backend::RestBackendClient;
