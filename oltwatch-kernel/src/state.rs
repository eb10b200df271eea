use parking_lot::Mutex;
use std::sync::Arc;

/// Process-wide state handed to collaborators explicitly (no globals).
pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_shared<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
