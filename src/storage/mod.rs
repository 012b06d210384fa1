mod memory;
mod sqlite;
mod store;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use store::{DebateStore, StatusUpdate};
