//! The `nova-compmgr` daemon: command line, built-in backends and plugins,
//! the JSON-lines display transport and the event loop.

pub mod backends;
pub mod cli;
pub mod plugins;
pub mod runtime;
pub mod stream;
