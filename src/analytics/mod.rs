//! Access recording for tracking codes.
//!
//! Every successful resolution appends one row to the access log. The log is
//! append-only; view counts are derived from it by the record store.

pub mod recorder;

pub use recorder::AccessRecorder;
