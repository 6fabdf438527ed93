//! Beacon-height entrypoints: produce a height's instructions, reproduce them on a
//! validator, and apply a finalized height to state.
//!
//! Application is height-sequenced: re-applying a height at or below the stored
//! marker is a no-op, and skipping a height is an error.

use crate::{
    applier::{Applier, TokenUpdate},
    builder::{BuildOutput, Builder},
    collector::collect_stateful_actions,
    router::route_actions,
    state::{beacon_height, changes_digest, State},
};
use anyhow::{anyhow, Context as _};
use meridian_types::{
    action::ShardInstructionBag,
    hash::H256,
    instruction::WireInstruction,
    ledger::{Key, Value},
    Params,
};
use tracing::{debug, info, warn};

/// Result of applying one beacon height.
#[derive(Debug, Default)]
pub struct StateTransitionResult {
    pub height: u64,
    /// Number of state writes committed, excluding the height marker.
    pub writes: usize,
    /// [`changes_digest`] of the committed writes.
    pub digest: H256,
    pub applied: usize,
    pub skipped: usize,
    pub token_updates: Vec<TokenUpdate>,
}

/// Builds the ordered instruction list for `height` from the shard instruction bag.
///
/// `state` must be the snapshot finalized at `height - 1`.
pub async fn build_instructions<S: State>(
    state: &S,
    params: &Params,
    height: u64,
    bag: &ShardInstructionBag,
) -> anyhow::Result<BuildOutput> {
    params.validate().context("validate params")?;
    let state_height = beacon_height(state)
        .await
        .context("read beacon height")?;
    if state_height.saturating_add(1) != height {
        return Err(anyhow!(
            "snapshot at height {state_height} cannot build height {height}"
        ));
    }

    let actions = collect_stateful_actions(bag, &params.allow_list());
    let routed = route_actions(&actions);
    let builder = Builder::load(state, params, height).await?;
    builder
        .build(routed)
        .await
        .with_context(|| format!("build instructions (height={height})"))
}

/// Rebuilds `height` and compares the result with the proposed wire instructions.
pub async fn verify_instructions<S: State>(
    state: &S,
    params: &Params,
    height: u64,
    bag: &ShardInstructionBag,
    proposed: &[WireInstruction],
) -> anyhow::Result<bool> {
    let expected = build_instructions(state, params, height, bag)
        .await?
        .to_wire();
    if expected.as_slice() != proposed {
        let first_mismatch = expected
            .iter()
            .zip(proposed)
            .position(|(a, b)| a != b)
            .unwrap_or(expected.len().min(proposed.len()));
        warn!(
            height,
            expected = expected.len(),
            proposed = proposed.len(),
            first_mismatch,
            "proposed instructions differ"
        );
        return Ok(false);
    }
    Ok(true)
}

/// Applies a finalized height's instructions to `state`.
///
/// Only processes the height if it is the next expected one.
pub async fn execute_beacon_height<S: State>(
    state: &mut S,
    params: &Params,
    height: u64,
    instructions: &[WireInstruction],
) -> anyhow::Result<StateTransitionResult> {
    let state_height = beacon_height(state)
        .await
        .context("read beacon height")?;

    // Already applied.
    if height <= state_height {
        debug!(height, state_height, "skipping applied height");
        return Ok(StateTransitionResult {
            height,
            ..Default::default()
        });
    }

    let expected_next_height = state_height.saturating_add(1);
    if height != expected_next_height {
        return Err(anyhow!(
            "non-sequential height: state_height={state_height}, \
             expected={expected_next_height}, requested={height}"
        ));
    }

    let output = {
        let mut applier = Applier::load(&*state, params, height).await?;
        applier.apply(instructions).await?;
        applier
            .finalize()
            .await
            .with_context(|| format!("finalize (height={height})"))?
    };

    let writes = output.changes.len();
    let digest = changes_digest(&output.changes);
    state
        .apply(output.changes)
        .await
        .with_context(|| format!("apply state changes (height={height})"))?;
    state
        .insert(Key::BeaconHeight, Value::Height(height))
        .await
        .with_context(|| format!("commit height marker (height={height})"))?;

    info!(height, writes, %digest, "committed beacon height");
    Ok(StateTransitionResult {
        height,
        writes,
        digest,
        applied: output.applied,
        skipped: output.skipped,
        token_updates: output.token_updates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mocks::{bag, issuing_action, seed_height, token, tx_id},
        state::Memory,
    };
    use commonware_runtime::{deterministic::Runner, Runner as _};

    #[test]
    fn heights_apply_in_sequence() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let mut state = Memory::default();

            execute_beacon_height(&mut state, &params, 1, &[]).await.unwrap();
            assert_eq!(beacon_height(&state).await.unwrap(), 1);

            // Re-applying is a no-op.
            let result = execute_beacon_height(&mut state, &params, 1, &[]).await.unwrap();
            assert_eq!(result.writes, 0);

            // Gaps are rejected.
            let err = execute_beacon_height(&mut state, &params, 3, &[])
                .await
                .unwrap_err();
            assert!(err.to_string().contains("non-sequential height"));
            assert_eq!(beacon_height(&state).await.unwrap(), 1);
        });
    }

    #[test]
    fn build_requires_previous_snapshot() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let mut state = Memory::default();
            seed_height(&mut state, 4).await;

            let empty = ShardInstructionBag::default();
            assert!(build_instructions(&state, &params, 4, &empty).await.is_err());
            assert!(build_instructions(&state, &params, 6, &empty).await.is_err());
            let output = build_instructions(&state, &params, 5, &empty).await.unwrap();
            assert!(output.instructions.is_empty());
        });
    }

    #[test]
    fn validator_reproduces_producer() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let params = Params::default();
            let state = Memory::default();
            let usd = token("usd");
            let bag = bag(&[
                issuing_action(0, usd, 100, tx_id(1)),
                issuing_action(1, usd, 0, tx_id(2)),
            ]);

            let produced = build_instructions(&state, &params, 1, &bag)
                .await
                .unwrap()
                .to_wire();
            assert_eq!(produced.len(), 2);
            assert!(verify_instructions(&state, &params, 1, &bag, &produced)
                .await
                .unwrap());

            let mut tampered = produced.clone();
            tampered.swap(0, 1);
            assert!(!verify_instructions(&state, &params, 1, &bag, &tampered)
                .await
                .unwrap());
            assert!(!verify_instructions(&state, &params, 1, &bag, &produced[..1])
                .await
                .unwrap());
        });
    }
}
