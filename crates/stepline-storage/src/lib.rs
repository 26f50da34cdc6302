// SQLite storage layer with sqlx

pub mod journal;
pub mod models;
pub mod repositories;

pub use journal::EventJournal;
pub use models::*;
pub use repositories::Database;
