//! msagents-bridge: a Microsoft 365 Agents / Teams channel adapter for a
//! conversational chat host.
//!
//! Inbound channel activities are authenticated, normalised into host chat
//! sessions (one thread per conversation per day) and run through the
//! host's lifecycle hooks. Host output comes back out as channel
//! activities: text replies, feedback hero cards and inline attachments.
//!
//! See `DESIGN.md` for the architecture.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod activity;
pub mod adapter;
pub mod auth;
pub mod bridge;
pub mod config;
pub mod connector;
pub mod host;
pub mod logging;
pub mod server;
