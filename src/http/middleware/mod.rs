//! Request pipeline middleware of a logical server.

pub mod address;
pub mod recovery;

pub use address::{replacement_address_layer, replacement_address_value, REPLACEMENT_ADDRESS_HEADER};
pub use recovery::{recover_panics, PanicHook, PanicReport};
