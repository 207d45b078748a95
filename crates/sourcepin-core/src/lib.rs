//! Run orchestration for sourcepin.
//!
//! This crate turns extracted manifest references into a source policy: the
//! `TaskCollector` deduplicates references and assigns their output order, the
//! `Engine` resolves every task on its own worker thread under a shared
//! cancellation token, and the `ResultAggregator` assembles the pin rules in
//! manifest order once the run completes. It also provides the run lifecycle
//! state machine and the Ctrl-C to cancellation wiring.

pub mod collector;
pub mod concurrency;
pub mod engine;
pub mod lifecycle;
pub mod results;

pub use collector::{Task, TaskCollector};
pub use concurrency::install_signal_handler;
pub use engine::{
    Engine, RunObserver, RunOptions, RunReport, Silent, SkippedReference, TaskOutcome,
};
pub use lifecycle::{validate_transition, RunState};
pub use results::{ResolutionResult, ResultAggregator};

use sourcepin_resolve::FatalError;
use sourcepin_schema::SourceKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Schema(#[from] sourcepin_schema::SchemaError),
    #[error("failed to resolve {kind} reference {reference}: {source}")]
    Resolve {
        kind: SourceKind,
        reference: String,
        #[source]
        source: FatalError,
    },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("run cancelled")]
    Cancelled,
}
