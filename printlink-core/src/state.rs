//! Shared-ownership helpers for state touched by the event loop and callers.

use parking_lot::Mutex;
use std::sync::Arc;

/// State written by the event-loop task and read from any caller task.
pub type Shared<T> = Arc<Mutex<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
