pub mod auth;

pub use auth::{AuthAdmin, AuthUser};
