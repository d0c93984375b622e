//! Reality marble dotfile manager.
//!
//! Configuration files scattered across the filesystem are collected into a
//! single directory tree, the *reality marble*, and projected back to their
//! original locations as symlinks. Which files belong where is decided by
//! rules read from `<marble>/.realitymarble`.
//!
//! The public API is organised into layers:
//!
//! - **[`paths`]**, **[`rule`]**, **[`ruleset`]**: pure path mapping between
//!   external locations and the store
//! - **[`operation`]**: one resolved external/internal pair and its checks
//! - **[`fs_ops`]**, **[`transaction`]**: filesystem mutations as data,
//!   applied all-or-nothing with privilege-escalation retry
//! - **[`marble`]**: the verbs (`collect`, `drop`, `project`, `materialize`,
//!   `touch`)
//! - **[`cli`]**, **[`commands`]**: command-line front end
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod fs_ops;
pub mod logging;
pub mod marble;
pub mod operation;
pub mod paths;
pub mod rule;
pub mod ruleset;
pub mod transaction;
