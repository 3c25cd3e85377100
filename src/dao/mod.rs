/// Database model definitions.
pub mod models;
/// Account/progress/completion persistence backends.
pub mod progress_store;
/// Storage abstraction layer for database operations.
pub mod storage;
