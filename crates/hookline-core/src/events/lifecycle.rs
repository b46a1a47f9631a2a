//! BEFORE/AFTER interception of a single operation.

use super::hub::EventHub;
use super::types::{LifecycleEvent, Timing};
use crate::error::InterceptError;

/// Run `operation` bracketed by two publications of `event`.
///
/// 1. `event` is published with [`Timing::Before`]. A handler failure aborts
///    here and the operation never runs.
/// 2. `operation` runs with mutable access to `event`, so it can attach its
///    result before the second publication. An operation error is returned
///    as-is and AFTER is not published.
/// 3. `event` is published again with [`Timing::After`]. A handler failure
///    turns the whole call into an error even though the operation's effect
///    already happened.
///
/// Callers publish their own "completed" notification only on `Ok`.
pub fn intercept<E, T, Err, Op>(
    hub: &EventHub,
    event: &mut E,
    operation: Op,
) -> Result<T, InterceptError<Err>>
where
    E: LifecycleEvent,
    Op: FnOnce(&mut E) -> Result<T, Err>,
{
    event.set_timing(Timing::Before);
    hub.publish(&*event).map_err(|source| InterceptError::Vetoed {
        phase: Timing::Before,
        source,
    })?;

    let output = operation(event).map_err(InterceptError::Operation)?;

    event.set_timing(Timing::After);
    hub.publish(&*event).map_err(|source| InterceptError::Vetoed {
        phase: Timing::After,
        source,
    })?;

    Ok(output)
}
