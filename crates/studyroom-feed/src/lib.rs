//! # studyroom-feed
//!
//! The consumed external interfaces of the chat subsystem, expressed as
//! traits ([`MessageFeed`], [`MessageSender`], [`ProfileService`]), plus:
//!
//! - the [`subscriber`] state machine that keeps a live feed subscription
//!   alive through transient failures with exponential backoff;
//! - an in-memory, channel-backed feed hub for tests and embedders
//!   ([`InMemoryFeed`]);
//! - a reqwest-based implementation of send and profile lookup against the
//!   REST backend ([`HttpApi`]).

pub mod http;
pub mod memory;
pub mod services;
pub mod subscriber;
pub mod wire;

pub use http::HttpApi;
pub use memory::InMemoryFeed;
pub use services::{FeedEvent, FeedSubscription, MessageFeed, MessageSender, ProfileService};
pub use subscriber::{
    spawn_subscriber, Backoff, StreamState, StreamStatus, StreamUpdate, SubscriberConfig,
    SubscriberHandle,
};
