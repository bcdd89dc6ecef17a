//! Request handler module
//!
//! Routes requests to the parcel handlers and maps their outcomes onto HTTP
//! responses.

pub mod error;
pub mod parcels;
pub mod router;

// Re-export main entry point
pub use router::handle_request;
