//! Meridian beacon instruction pipeline.
//!
//! This crate turns the per-shard actions carried in a beacon block into one ordered
//! list of instructions ([`build_instructions`]) and applies a finalized list to
//! state ([`execute_beacon_height`]).
//!
//! ## Determinism requirements
//! - Producer and validator run the same code; a validator rebuilds a height and
//!   compares wire forms ([`verify_instructions`]).
//! - Do not let iteration order of hash-based collections influence outputs. Every
//!   ordered grouping is a `BTreeMap` keyed by shard, pool pair, chain or height.
//! - Do not use floating point. Ratios are compared by `u128` cross multiplication.
//! - Protocol state is read once per height into an exclusively owned working copy
//!   and written back once.
//!
//! ## Minimal pipeline (example)
//! ```rust,ignore
//! use meridian_execution::{build_instructions, execute_beacon_height, state::Memory};
//! use meridian_types::{action::ShardInstructionBag, Params};
//!
//! # async fn example(bag: ShardInstructionBag) -> anyhow::Result<()> {
//! let params = Params::default();
//! let mut state = Memory::default();
//! // Build height 1 against the snapshot at height 0, then apply it.
//! let output = build_instructions(&state, &params, 1, &bag).await?;
//! execute_beacon_height(&mut state, &params, 1, &output.to_wire()).await?;
//! # Ok(())
//! # }
//! ```

pub mod applier;
pub mod builder;
pub mod collector;
pub mod outcome;
pub mod protocols;
pub mod router;
pub mod sequencer;
pub mod state;
pub mod state_transition;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

#[cfg(test)]
mod pipeline_tests;

pub use applier::{Applier, ApplyOutput, NetChange, TokenUpdate, UpdatingInfo};
pub use builder::{BuildOutput, Builder};
pub use collector::{collect_stateful_actions, ActionsByShard};
pub use outcome::{ActionDiagnostic, ActionOutcome, Diagnostic};
pub use protocols::{BoundedChain, HeaderChain, HeaderChainError, WorkingSet};
pub use router::{route_actions, RoutedActions, ShardActions};
pub use sequencer::{order_trades, QueuedTrade};
pub use state::{changes_digest, request_status, State, Status};
pub use state_transition::{
    build_instructions, execute_beacon_height, verify_instructions, StateTransitionResult,
};
