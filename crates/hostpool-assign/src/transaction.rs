//! Assignment transaction: the one place assignments are written.
//!
//! Each operation runs in a single redb write transaction. redb admits one
//! writer at a time, so re-validating the server inside the transaction is
//! a compare-and-swap on `assigned_team_count`: two commits racing for the
//! last slot cannot both succeed. Any error aborts the transaction, leaving
//! no partial state behind.

use tracing::{debug, info};

use hostpool_placement::{FilterContext, check, team_cap};
use hostpool_state::*;

use crate::error::{AssignError, AssignResult};
use crate::lifecycle::RequestPhase;

/// Commit `team` to the server selected from `snapshot`.
///
/// Fails with `CapacityExceeded` if the server filled up since the snapshot,
/// or `ConcurrentModification` if the server, the tier's rule, or the team's
/// assignments changed in a way that invalidates the choice.
pub fn commit(
    store: &StateStore,
    team_id: &str,
    snapshot: &Server,
    rule: &AssignmentRule,
    resource: &ResourceSpec,
) -> AssignResult<Assignment> {
    let assignment = store.transact(|scope| {
        commit_in(scope, team_id, snapshot, rule, resource, None)
    })?;
    info!(
        assignment = %assignment.id,
        team = %team_id,
        server = %assignment.server_id,
        tier = %assignment.tier,
        "assignment committed"
    );
    Ok(assignment)
}

/// Release an active assignment and free its slot.
pub fn release(store: &StateStore, assignment_id: &str) -> AssignResult<Assignment> {
    let released = store.transact(|scope| release_in(scope, assignment_id))?;
    info!(
        assignment = %released.id,
        team = %released.team_id,
        server = %released.server_id,
        "assignment released"
    );
    Ok(released)
}

/// Move an active assignment to the server selected from `snapshot`.
///
/// The old assignment is released and the new one committed in the same
/// transaction; on failure the team stays where it was.
pub fn migrate(
    store: &StateStore,
    assignment_id: &str,
    snapshot: &Server,
    rule: &AssignmentRule,
) -> AssignResult<Assignment> {
    let (old, new) = store.transact(|scope| {
        let old = release_in(scope, assignment_id)?;
        let new = commit_in(scope, &old.team_id, snapshot, rule, &old.resource, Some(&old.id))?;
        Ok::<_, AssignError>((old, new))
    })?;
    info!(
        team = %new.team_id,
        from = %old.server_id,
        to = %new.server_id,
        assignment = %new.id,
        "assignment migrated"
    );
    Ok(new)
}

fn commit_in(
    scope: &mut WriteScope<'_>,
    team_id: &str,
    snapshot: &Server,
    rule: &AssignmentRule,
    resource: &ResourceSpec,
    replacing: Option<&str>,
) -> AssignResult<Assignment> {
    let tier = rule.tier;

    let live_version = scope.active_rule(tier)?.map_or(0, |r| r.version);
    if live_version != rule.version {
        return Err(AssignError::ConcurrentModification(format!(
            "rule for tier {tier} moved from version {} to {live_version}",
            rule.version
        )));
    }

    let assignments = scope.active_assignments(tier)?;
    if assignments
        .iter()
        .any(|a| a.team_id == team_id && Some(a.id.as_str()) != replacing)
    {
        return Err(AssignError::ConcurrentModification(format!(
            "team {team_id} already holds an assignment in tier {tier}"
        )));
    }

    let live = scope.get_server(&snapshot.id)?.ok_or_else(|| {
        AssignError::ConcurrentModification(format!("server {} was removed", snapshot.id))
    })?;
    if live.tier != tier {
        return Err(AssignError::ConcurrentModification(format!(
            "server {} moved to tier {}",
            live.id, live.tier
        )));
    }
    if live.assigned_team_count >= team_cap(&live, rule) {
        return Err(AssignError::CapacityExceeded(live.id));
    }

    let servers = scope.list_servers(tier)?;
    let ctx = FilterContext::from_assignments(&servers, &assignments);
    if let Err(reason) = check(&live, rule, &ctx) {
        return Err(AssignError::ConcurrentModification(format!(
            "server {} no longer eligible ({reason:?})",
            live.id
        )));
    }

    let server = scope.adjust_team_count(&live.id, 1)?;
    let assignment = Assignment {
        id: scope.next_assignment_id()?,
        team_id: team_id.to_string(),
        tier,
        server_id: server.id,
        resource: resource.clone(),
        rule_version: rule.version,
        status: AssignmentStatus::Active,
        created_at: epoch_secs(),
        released_at: None,
    };
    scope.put_assignment(&assignment)?;
    debug!(assignment = %assignment.id, count = server.assigned_team_count, "slot reserved");
    Ok(assignment)
}

fn release_in(scope: &mut WriteScope<'_>, assignment_id: &str) -> AssignResult<Assignment> {
    let mut assignment = scope
        .get_assignment(assignment_id)?
        .ok_or_else(|| AssignError::AssignmentNotFound(assignment_id.to_string()))?;
    let phase = RequestPhase::from(assignment.status);
    if phase == RequestPhase::Released {
        return Err(AssignError::AlreadyReleased(assignment_id.to_string()));
    }
    phase.transition(RequestPhase::Released)?;

    scope.adjust_team_count(&assignment.server_id, -1)?;
    assignment.status = AssignmentStatus::Released;
    assignment.released_at = Some(epoch_secs());
    scope.put_assignment(&assignment)?;
    Ok(assignment)
}
