use crate::errors::PreflightViolation;
use crate::identity::IdentityMap;
use crate::types::{ActionType, BatchState};

/// Checks run once before the first step.
///
/// Only `give` is constrained: every target must be an eligible member and
/// every amount strictly positive. `add` batches always pass.
pub fn check(state: &BatchState, identities: &IdentityMap) -> Result<(), PreflightViolation> {
    if state.action_type() != ActionType::Give {
        return Ok(());
    }
    if let Some(entry) = state
        .entries()
        .iter()
        .find(|e| !identities.is_eligible(&e.target_id))
    {
        return Err(PreflightViolation::IneligibleTarget(entry.target_id.clone()));
    }
    if let Some(entry) = state.entries().iter().find(|e| e.amount <= 0) {
        return Err(PreflightViolation::NonPositiveGiveAmount {
            target_id: entry.target_id.clone(),
            amount: entry.amount,
        });
    }
    Ok(())
}
