mod coordinator;
mod outcome;
mod plan;

pub use coordinator::{Attempt, OperationKind, RetryCoordinator};
pub use outcome::RetryOutcome;
pub use plan::RetryPlan;
