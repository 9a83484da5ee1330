//! Approval & safety classifier (C5, §4.5): destructive-command detection,
//! approval signatures, and the allow/deny/once/session/workspace scoping
//! that lets a user's decision outlive a single step.
//!
//! The safety classifier is an LLM collaborator (§1 "out of scope"); this
//! crate only defines the narrow trait it's reached through
//! ([`SafetyClassifier`]) plus a regex-based stand-in
//! ([`HeuristicClassifier`]) usable in tests and `doctor` dry-runs, in the
//! same spirit as `zace_planner`'s `PlannerLlmClient` trait.

mod classifier;
mod resolve;
mod store;

pub use classifier::{HeuristicClassifier, SafetyClassifier};
pub use resolve::{apply_user_reply, resolve_command_approval, ApprovalContext, UserApprovalReply};
pub use store::{ApprovalRule, ApprovalStore, RuleDecision};
