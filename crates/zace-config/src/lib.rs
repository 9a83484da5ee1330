//! Runtime configuration: the layered load of `spec.md` §6's enumerated
//! options, plus the runtime-path resolution every other crate needs.
//!
//! Grounded in the teacher's `csa-config` crate: a TOML project file merged
//! over built-in defaults (`config.rs`/`config_merge.rs`), validated before
//! use (`validate.rs`), with runtime paths resolved relative to a project
//! root (`paths.rs`) rather than the teacher's XDG user-level directories —
//! this runtime has no user-level config, only a project-local `.zace/`.

pub mod config;
pub mod paths;
pub mod validate;

pub use config::{
    CompletionValidationMode, DocContextMode, ExecutorAnalysisMode, RuntimeConfig,
};
pub use validate::{Severity, ValidationIssue};
