//! Shared primitives for ChatSweep.

pub mod error;
