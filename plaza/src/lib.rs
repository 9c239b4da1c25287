// Library interface for the Plaza client core
#[macro_use]
pub mod logging;

pub mod api;
pub mod auth;
pub mod config;
pub mod confirm;
pub mod display;
pub mod feed;
pub mod session;
pub mod storage;
pub mod thread;

#[cfg(test)]
pub(crate) mod testing;
