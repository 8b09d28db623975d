//! # muxctx
//!
//! A tmux session manager that gives every session its own kubeconfig.
//!
//! Sessions are created from repositories, browsed and previewed in a
//! terminal UI, saved to a YAML manifest and restored from it. Each session
//! exports a `KUBECONFIG` pointing at a private copy of the user's contexts,
//! so switching context in one session never leaks into another.
//!
//! ## Quick Example
//!
//! ```toml
//! # ~/.config/muxctx/config.toml
//!
//! [popup]
//! width = "90%"
//! border_color = "magenta"
//!
//! [sessions]
//! sort = "newest"
//!
//! [repositories]
//! roots = ["~/src", "~/work"]
//! depth = 3
//! ```
//!
//! ## Architecture
//!
//! The crate is organized into these modules:
//!
//! - [`tmux`]: the [`tmux::Multiplexer`] trait and its tmux CLI driver
//! - [`layout`]: tmux window layout strings
//! - [`session`]: the live session catalog
//! - [`kube`]: kubeconfig parsing and per-session kubeconfig files
//! - [`completion`]: zsh-backed command completion
//! - [`coordinator`]: multi-step operations across tmux and kubeconfigs
//! - [`router`]: key handling and focus for the UI
//! - [`ui`]: the ratatui front-end
//! - [`manifest`]: saved sessions
//! - [`repos`]: repository discovery for the create picker
//! - [`config`], [`loader`]: settings
//! - [`cli`], [`logging`], [`ansi`], [`error`]: plumbing

pub mod ansi;
pub mod cli;
pub mod completion;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod kube;
pub mod layout;
pub mod loader;
pub mod logging;
pub mod manifest;
pub mod repos;
pub mod router;
pub mod session;
pub mod tmux;
pub mod ui;

#[cfg(test)]
mod testing;

pub use error::{MuxctxError, Result};
