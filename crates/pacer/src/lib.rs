pub mod cli;
pub mod config;
pub mod runtime;

mod device;
mod output;
mod queue;
mod sink;
mod source;
mod status;
