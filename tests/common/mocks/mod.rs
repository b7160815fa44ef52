pub mod scripted_backend;

#[allow(unused_imports)]
pub use scripted_backend::*;
