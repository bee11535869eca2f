//! # Keystone Core Event System
//!
//! Named publish/subscribe channels used for lifecycle signalling.
//!
//! An [`EventChannel`] is generic over a closed event enum implementing
//! [`Event`]. Listeners subscribe to an event *name* (as returned by
//! [`Event::name`]) and are invoked synchronously, in registration order, by
//! [`EventChannel::publish`]. One-shot subscriptions (optionally filtered) are
//! removed before their first invocation, which is what the dependency loader
//! relies on to race `module.ready` against `module.failed`.
//!
//! The application context owns one process-wide
//! [`EventChannel<LifecycleEvent>`](types::LifecycleEvent); modules are free
//! to own private channels over their own event types.
pub mod channel;
pub mod error;
pub mod types;

use std::fmt;

/// Identifier handed out for every subscription
pub type SubscriptionId = u64;

/// Core event trait
pub trait Event: fmt::Debug + Send + Sync + 'static {
    /// Get the name of this event
    fn name(&self) -> &'static str;
}

/// Re-export important types
pub use channel::{
    EventChannel, ListenerPanic, PublishReport, SharedEventChannel, SubscriptionGuard,
    create_channel,
};
pub use error::EventSystemError;
pub use types::LifecycleEvent;
