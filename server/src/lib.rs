//! Campus Server
//!
//! Collaboration backend for student groups. This crate holds the channel
//! permission engine that every channel, post and comment action is checked
//! against.

pub mod config;
pub mod permissions;
