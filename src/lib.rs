pub mod channels;
pub mod chat_commands;
pub mod cleanup;
pub mod config;
pub mod lifecycle;
pub mod retention;
pub mod runtime;
pub mod scheduler;

pub use channels::telegram;
pub use chatsweep_app::logging;
pub use chatsweep_channels::transport;
pub use chatsweep_core::error;
pub use chatsweep_storage::chat_state;
pub use chatsweep_storage::db;
pub use chatsweep_storage::ledger;
