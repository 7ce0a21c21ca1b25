//! Persistence layer
//!
//! - `line_store`: newline-delimited JSON file with append, scan and atomic rewrite
//! - `queue`: FIFO task queue that serializes writers against one store

pub mod line_store;
pub mod queue;

pub use line_store::{LineStore, Rewrite, StorageError, StorageResult};
pub use queue::{QueueError, TaskQueue};
