//! Observability for the backup core.
//!
//! One structured JSON line per event, written synchronously. The capture
//! pipeline logs the same scope (backup name, operation, table) on nearly
//! every line, so loggers carry persistent fields that are merged into
//! each event.

mod logger;

pub use logger::{Logger, Severity};
