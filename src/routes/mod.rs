pub mod access;
pub mod auth;
pub mod forms;
pub mod health;
pub mod roles;
pub mod tickets;
