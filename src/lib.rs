//! Heartree library crate
//!
//! Grows decision trees of creative ideas. A prompt becomes a tree of short ideas;
//! expanding a node asks a language model for a few more ideas under it, and every
//! node can host a conversation that is illustrated and spoken back.

pub mod api;
pub mod cli;
pub mod config;
pub mod controller;
pub mod ideas;
pub mod models;
pub mod prompts;
pub mod retry;
pub mod session;
pub mod upstream;

#[cfg(test)]
mod test_support;

pub use controller::Core;
