//! Rule definitions.
//!
//! - [`FilterRule`]: phase-one message filters that act immediately
//! - [`StateRule`]: phase-two TTL rules driving the message lifecycle

mod duration;
mod filter;
mod state;

pub use duration::{format_duration, parse_duration};
pub use filter::FilterRule;
pub use state::{Lifetime, StateRule, Ttl};
