//! # Keystone Core Event System Errors
//!
//! Defines [`EventSystemError`], raised when a caller asks for strict delivery
//! semantics (see [`PublishReport::into_result`](crate::event::PublishReport::into_result))
//! or manipulates a subscription that does not exist.
use crate::event::SubscriptionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventSystemError {
    #[error("{count} listener(s) panicked while handling event '{event_name}': {messages}")]
    ListenerPanicked {
        event_name: &'static str,
        count: usize,
        messages: String,
    },

    #[error("No subscription with ID {id}")]
    UnknownSubscription { id: SubscriptionId },
}
