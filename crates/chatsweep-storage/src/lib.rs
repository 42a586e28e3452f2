//! Storage and persistence domain for ChatSweep.

pub mod chat_state;
pub mod db;
pub mod ledger;
