pub mod action;
pub mod health;
