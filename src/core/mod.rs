pub mod assistant;
pub mod auth;
pub mod backends;
pub mod files;
pub mod services;
pub mod traits;
