//! Feature request lifecycle: roles, statuses, the transition table and
//! the engine that applies it.

pub mod engine;
pub mod error;
pub mod transitions;
pub mod types;

pub use engine::RequestEngine;
pub use error::WorkflowError;
pub use transitions::{Action, TransitionInput};
pub use types::{Principal, Priority, RequestStatus, Role};
