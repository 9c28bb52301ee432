//! `taskbridge` - request/response bridge over an interactive task scheduler
//!
//! Drives the scheduler's console under a pseudo-terminal, frames its replies
//! heuristically and parses them into typed task records.

pub mod bridge;
pub mod cache;
pub mod cli;
pub mod core;
pub mod fs;
pub mod parse;
