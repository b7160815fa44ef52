pub mod fetch_slot;

pub use fetch_slot::{FetchSlots, FetchTicket, SharedFetch};
