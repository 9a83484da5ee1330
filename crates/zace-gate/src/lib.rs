//! Completion-gate pipeline (C4, §4.4): planner-declared gates merged with
//! auto-discovered lint/test commands, masking rejection, per-gate
//! approval, sequential execution, and the freshness check that together
//! decide whether a `complete` planner action actually finalizes a run.

mod discovery;
mod masking;
mod pipeline;
mod task_spec;

pub use discovery::discover_gates;
pub use masking::detect_masking;
pub use pipeline::{
    run_completion_pipeline, CompletionContext, GateBlockReason, GateOutcome, RepeatedBlockTracker,
};
pub use task_spec::parse_task_gates;
