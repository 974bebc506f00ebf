#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod forge;
pub mod git;
pub mod report;
pub mod util;
