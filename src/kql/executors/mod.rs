pub mod sqlite;

pub use sqlite::SqliteExecutor;
