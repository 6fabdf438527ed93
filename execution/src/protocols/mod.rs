//! Protocol processors.
//!
//! Each submodule holds two halves of one protocol:
//! - `Builder` handlers that validate an action against the snapshot plus the
//!   working copy and emit instructions,
//! - effect functions that mutate a [`WorkingSet`] from accepted instruction
//!   content. The builder and the applier both run the same effects, so the
//!   state a producer observes while building matches what the block replays.

use crate::state::State;
use anyhow::{Context as _, Result};
use meridian_types::{
    ledger::{Key, PdeState, PortalState, Value},
    relaying::{RelayChain, RelayingHeaderChainState},
};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod bridge;
pub mod pde;
pub mod portal;
pub mod relaying;

pub use relaying::{BoundedChain, HeaderChain, HeaderChainError};

/// Why an instruction's effect cannot be applied to a working copy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EffectError {
    #[error("pool {0} not found")]
    MissingPool(String),
    #[error("custodian {0} not found")]
    MissingCustodian(String),
    #[error("request {0} not found")]
    MissingRequest(String),
    #[error("{0} out of range")]
    OutOfRange(&'static str),
}

/// Protocol state a single height reads once and writes back once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkingSet {
    pub pde: PdeState,
    pub portal: PortalState,
    pub chains: BTreeMap<RelayChain, RelayingHeaderChainState>,
}

impl WorkingSet {
    pub async fn load<S: State>(state: &S) -> Result<Self> {
        let pde = match state.get(&Key::PdeState).await.context("read pde state")? {
            Some(Value::PdeState(pde)) => pde,
            _ => PdeState::default(),
        };
        let portal = match state
            .get(&Key::PortalState)
            .await
            .context("read portal state")?
        {
            Some(Value::PortalState(portal)) => portal,
            _ => PortalState::default(),
        };
        let mut chains = BTreeMap::new();
        for chain in RelayChain::ALL {
            if let Some(Value::RelayingChain(chain_state)) = state
                .get(&Key::RelayingChain(chain))
                .await
                .with_context(|| format!("read relaying chain {chain:?}"))?
            {
                chains.insert(chain, chain_state);
            }
        }
        Ok(Self {
            pde,
            portal,
            chains,
        })
    }

    pub fn into_writes(self) -> Vec<(Key, Value)> {
        let mut writes = vec![
            (Key::PdeState, Value::PdeState(self.pde)),
            (Key::PortalState, Value::PortalState(self.portal)),
        ];
        for (chain, chain_state) in self.chains {
            writes.push((Key::RelayingChain(chain), Value::RelayingChain(chain_state)));
        }
        writes
    }
}

/// Floor square root.
pub(crate) fn integer_sqrt(value: u128) -> u64 {
    if value == 0 {
        return 0;
    }
    let mut x = value;
    let mut y = (x + 1) >> 1;
    while y < x {
        x = y;
        y = (x + value / x) >> 1;
    }
    x as u64
}

/// `a * b / c` in `u128`, `None` on a zero divisor or a result beyond `u64`.
pub(crate) fn mul_div(a: u64, b: u64, c: u64) -> Option<u64> {
    if c == 0 {
        return None;
    }
    u64::try_from(a as u128 * b as u128 / c as u128).ok()
}

/// `ceil(a * b / c)` in `u128`.
pub(crate) fn mul_div_ceil(a: u64, b: u64, c: u64) -> Option<u64> {
    if c == 0 {
        return None;
    }
    let product = a as u128 * b as u128;
    u64::try_from(product.div_ceil(c as u128)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_sqrt_floors() {
        assert_eq!(integer_sqrt(0), 0);
        assert_eq!(integer_sqrt(1), 1);
        assert_eq!(integer_sqrt(15), 3);
        assert_eq!(integer_sqrt(16), 4);
        assert_eq!(integer_sqrt(1_000 * 4_000), 2_000);
        assert_eq!(integer_sqrt(u64::MAX as u128 * u64::MAX as u128), u64::MAX);
    }

    #[test]
    fn mul_div_rounding() {
        assert_eq!(mul_div(7, 3, 2), Some(10));
        assert_eq!(mul_div_ceil(7, 3, 2), Some(11));
        assert_eq!(mul_div(1, 1, 0), None);
        assert_eq!(mul_div(u64::MAX, 2, 1), None);
        assert_eq!(mul_div(u64::MAX, u64::MAX, u64::MAX), Some(u64::MAX));
    }
}
