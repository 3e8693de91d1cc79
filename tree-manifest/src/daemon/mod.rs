//! Process-level signal handling.

pub mod shutdown;
