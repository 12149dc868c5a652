//! Correlation of in-flight echo requests.
//!
//! The table maps (identifier, sequence) to the host that sent the request
//! so replies can be relayed back. It is the only state shared between the
//! request and reply loops.

mod table;

pub use table::{CorrelationTable, EvictionPolicy};
