//! Topic coordination
//!
//! Per-mode turn-taking rules that decide which object key an agent may
//! write next in a topic.

pub mod engine;
pub mod error;
pub mod mode;
pub mod modes;
pub mod request;
pub mod rules;
pub mod state;

pub use engine::{CoordinationEngine, TopicContext};
pub use error::CoordinationError;
pub use mode::TopicMode;
pub use request::TopicRequest;
pub use rules::ModeRules;
pub use state::TopicState;
