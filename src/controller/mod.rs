pub mod clock;
pub mod rollout;

pub use rollout::{Context, RolloutError, RolloutReport};
