pub mod auth;

pub use auth::Authed;
