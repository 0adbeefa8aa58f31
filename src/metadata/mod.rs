//! Detection metadata ingest.
//!
//! The inference worker reports per-frame results as JSON documents over a
//! single TCP connection. This module provides:
//! - `listener`: the persistent, self-restarting accept/receive loop
//! - `decoder`: raw payload normalization into `DetectionRecord`
//! - `history`: a bounded FIFO of formatted records for display
//!
//! The listener serves exactly one peer at a time and survives disconnects
//! and malformed input for the lifetime of the process. Producers must write
//! one complete JSON document per send; chunk boundaries are not reassembled
//! across reads.

pub mod decoder;
pub mod history;
pub mod listener;

pub use decoder::{decode_payload, DetectionRecord, MetadataEvent};
pub use history::MetadataHistory;
pub use listener::{ConnectionListener, ListenerConfig, ListenerHandle};
