//! Common types for the meridian beacon pipeline.
//!
//! - [`action`]: shard-produced actions and their JSON payloads.
//! - [`instruction`]: the consensus-visible instruction union and its flat wire form.
//! - [`ledger`]: persistent keys, values and records.
//! - [`relaying`]: relayed external chain headers.
//! - [`params`]: pipeline parameters.

pub mod action;
pub mod codec;
pub mod content;
pub mod hash;
pub mod instruction;
pub mod ledger;
pub mod meta;
pub mod params;
pub mod relaying;

pub use action::{Action, DecodeError, ShardInstructionBag};
pub use hash::{TokenId, TxId, H256};
pub use instruction::{Instruction, InstructionError, Verdict, WireInstruction};
pub use ledger::{Key, Value};
pub use meta::{MetaType, ShardId};
pub use params::{ConfigError, Params};
pub use relaying::RelayChain;
