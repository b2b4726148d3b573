pub mod body;
pub mod handler;
pub mod listener;
