//! Rigger: tool acquisition and repository sync for a SillyTavern checkout.

pub mod acquire;
pub mod classify;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod git;
pub mod pathreg;
pub mod platform;
pub mod probe;
pub mod runner;
pub mod settings;
pub mod strategy;
pub mod switch;
pub mod sync;
