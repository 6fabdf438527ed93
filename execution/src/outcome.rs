//! Per-action results.

use meridian_types::{
    action::DecodeError,
    meta::{MetaType, ShardId},
    Instruction,
};
use thiserror::Error;

/// Why an action produced no instruction, or a rejection instead of an acceptance.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Diagnostic {
    #[error("malformed payload: {0}")]
    Decode(#[from] DecodeError),
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Instructions emitted for one action plus an optional diagnostic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub instructions: Vec<Instruction>,
    pub diagnostic: Option<Diagnostic>,
}

impl ActionOutcome {
    pub fn accepted(instruction: Instruction) -> Self {
        Self {
            instructions: vec![instruction],
            diagnostic: None,
        }
    }

    pub fn rejected(instruction: Instruction, reason: impl Into<String>) -> Self {
        Self {
            instructions: vec![instruction],
            diagnostic: Some(Diagnostic::Rejected(reason.into())),
        }
    }

    pub fn with_instructions(instructions: Vec<Instruction>, reason: impl Into<String>) -> Self {
        Self {
            instructions,
            diagnostic: Some(Diagnostic::Rejected(reason.into())),
        }
    }

    pub fn malformed(err: DecodeError) -> Self {
        Self {
            instructions: Vec::new(),
            diagnostic: Some(Diagnostic::Decode(err)),
        }
    }
}

/// A diagnostic tagged with the action it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionDiagnostic {
    pub meta_type: MetaType,
    pub shard_id: ShardId,
    pub diagnostic: Diagnostic,
}
