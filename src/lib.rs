pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod git;
pub mod lfs;
pub mod output;
pub mod prompt;
pub mod recovery;
pub mod rejection;

#[cfg(test)]
mod testutil;
