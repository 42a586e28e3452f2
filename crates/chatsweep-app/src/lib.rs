//! Process-level plumbing shared by the ChatSweep binary.

pub mod logging;
