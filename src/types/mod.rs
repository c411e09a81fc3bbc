// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Phantom-typed ids plus the generated stack name.

mod id;
mod stack_name;

pub use id::{DeploymentId, Id, TargetId};
pub use stack_name::StackName;
