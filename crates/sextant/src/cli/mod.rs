//! CLI command implementations.

mod display;

pub mod calls;
pub mod clean;
pub mod export;
pub mod index;
pub mod inheritance;
pub mod init;
pub mod query;
pub mod refs;
pub mod search;
pub mod show;
pub mod source;
pub mod stats;
