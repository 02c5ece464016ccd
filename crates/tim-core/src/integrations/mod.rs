//! Task and calendar sources.
//!
//! Protocol-specific sync lives outside the core. What the core sees is the
//! [`Integrator`] trait: typed events and busy blocks in, recently changed
//! events out.

pub mod json_feed;
pub mod traits;

pub use json_feed::{FeedProvider, JsonFeedIntegrator, PublishedEvent};
pub use traits::{
    IntegrationError, IntegrationResult, Integrator, IntegratorProvider, NoIntegrators,
};
