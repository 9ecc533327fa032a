//! Data types for the sqlew engine.
//!
//! Rows store integer IDs and enum codes; the types here are the resolved
//! projections and validated inputs that cross the tool-call boundary.

pub mod constraint;
pub mod decision;
pub mod enums;
pub mod project;
pub mod task;

pub use constraint::{Constraint, ConstraintFilter, ConstraintInput};
pub use decision::{
    Decision, DecisionContextInput, DecisionTemplate, DecisionValue, DecisionVersion,
    SearchFilter, SetDecision, TagMatchMode,
};
pub use enums::{
    ChangeType, ConstraintCategory, DecisionStatus, DetectionSource, Layer, Priority,
    TaskStatus,
};
pub use project::{Agent, FileChange, FileChangeInput, Message, MessageInput, Project};
pub use task::{Task, TaskDependency, TaskInput, TaskLinkKind, PrunedFile};
