//! Account pool scheduling and outbound request throttling.
//!
//! [`AccountSelector`] scores and claims a usable worker account from
//! the pool; [`RequestThrottle`] serializes outbound requests per
//! upstream class with a minimum spacing so shared credentials are
//! never rate-limited or banned upstream.

pub mod selector;
pub mod throttle;

pub use selector::{AccountSelector, SelectorConfig, SelectorError};
pub use throttle::{RequestThrottle, ThrottleConfig, ThrottleError, UpstreamClass};
