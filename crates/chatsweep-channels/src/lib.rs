//! The boundary between the cleanup core and a chat-messaging provider.

pub mod transport;
