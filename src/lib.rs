//! Edit a server-owned value locally while it is kept in sync in the
//! background.

pub mod config;
pub mod remote;
pub mod sync;
