pub mod database;
pub mod entities;
pub mod file_storage;
pub mod repositories;
pub mod traits;
