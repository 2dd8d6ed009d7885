//! Walks a matched chain and interprets each unit's [`Flow`].

use std::collections::VecDeque;

use strata_core::{Reply, StrataError, StrataResult};
use strata_router::ChainLink;

use crate::context::{Context, Cursor};
use crate::unit::{Flow, UnitId, UnitRef};

/// Chain executor.
///
/// Units run strictly in chain order. A [`Flow::JumpTo`] queues the named
/// units behind any targets still waiting from an earlier jump; each must sit
/// after the jumping unit and must not have run or been queued already.
/// Linear execution resumes after the furthest unit reached so far. Every
/// unit runs at most once per request. The first `Terminate` or `Fail` ends
/// the walk, so at most one terminal outcome exists per request. Nothing a
/// unit did before a later failure is rolled back.
///
/// The walk is a plain future. Dropping it, for instance when the transport
/// aborts, stops further units from running.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor;

impl Executor {
    /// Runs `chain` against `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing unit, or a configuration error when a
    /// jump names a unit that is not later in the chain, that already ran or
    /// is already queued, or when the chain ends without a terminal outcome.
    pub async fn run(chain: &[ChainLink<UnitRef>], ctx: &mut Context) -> StrataResult<Reply> {
        let mut scheduled: VecDeque<usize> = VecDeque::new();
        let mut claimed = vec![false; chain.len()];
        let mut next = 0;

        loop {
            let position = match scheduled.pop_front() {
                Some(position) => position,
                None if next < chain.len() => {
                    next += 1;
                    next - 1
                }
                None => return Err(exhausted(chain, ctx)),
            };
            claimed[position] = true;

            let link = &chain[position];
            let id = link.unit.id();
            ctx.set_cursor(Cursor {
                origin: id,
                position,
                prefix: link.scope.clone(),
            });
            tracing::trace!(unit = %id, position, "running unit");

            match link.unit.call(ctx).await {
                Flow::Proceed => {}
                Flow::JumpTo(targets) => {
                    let positions = locate(chain, position, &targets, &claimed)?;
                    tracing::debug!(unit = %id, targets = ?targets, "jumping");
                    for &target in &positions {
                        claimed[target] = true;
                    }
                    if let Some(furthest) = positions.iter().max() {
                        next = next.max(furthest + 1);
                    }
                    scheduled.extend(positions);
                }
                Flow::Terminate(reply) => return Ok(reply),
                Flow::Fail(err) => {
                    tracing::debug!(unit = %id, error = %err, "unit failed");
                    return Err(err);
                }
            }
        }
    }
}

/// Resolves jump targets to chain positions, rejecting any target that is
/// missing, earlier in the chain, already claimed or named twice.
fn locate(
    chain: &[ChainLink<UnitRef>],
    from: usize,
    targets: &[UnitId],
    claimed: &[bool],
) -> StrataResult<Vec<usize>> {
    let origin = chain[from].unit.id();
    if targets.is_empty() {
        return Err(StrataError::configuration(format!(
            "unit `{origin}` jumped without naming a target"
        )));
    }

    let mut positions = Vec::with_capacity(targets.len());
    for target in targets {
        let position = chain
            .iter()
            .enumerate()
            .skip(from + 1)
            .find(|(_, link)| link.unit.id() == *target)
            .map(|(position, _)| position)
            .ok_or_else(|| {
                StrataError::configuration(format!(
                    "unit `{origin}` jumped to `{target}`, which is not later in the chain"
                ))
            })?;
        if claimed[position] || positions.contains(&position) {
            return Err(StrataError::configuration(format!(
                "unit `{origin}` jumped to `{target}`, which already ran or is already scheduled"
            )));
        }
        positions.push(position);
    }
    Ok(positions)
}

fn exhausted(chain: &[ChainLink<UnitRef>], ctx: &Context) -> StrataError {
    let last = chain.last().map_or("<empty>", |link| link.unit.id().as_str());
    StrataError::configuration(format!(
        "chain for {} {} ended at `{last}` without a terminal outcome",
        ctx.request().method(),
        ctx.request().path()
    ))
}
