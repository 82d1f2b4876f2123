pub mod locator;
pub mod naming;
pub mod orchestrator;
pub mod readiness;
pub mod replicaset;
pub mod traffic;
pub mod validation;

pub use locator::*;
pub use naming::*;
pub use orchestrator::*;
pub use readiness::*;
pub use replicaset::*;
pub use traffic::*;
pub use validation::*;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "rollout_test.rs"]
mod tests;
