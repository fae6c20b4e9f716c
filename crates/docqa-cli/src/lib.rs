//! docqa CLI library: argument definitions and command implementations.

pub mod cli;
pub mod commands;

pub use cli::{BatchArgs, Cli, Command, MetadataArgs, ProcessArgs};
