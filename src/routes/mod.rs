pub mod abilities;
pub mod health;
pub mod users;
