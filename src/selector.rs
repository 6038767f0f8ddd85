//! Dependency-aware "what's next" selection.
//!
//! Deterministic and order-stable: declaration order breaks ties between
//! simultaneously ready subtasks. This is a first-ready pick, not a
//! topological sort.

use crate::models::{Subtask, SubtaskStatus, Ticket};

/// Pick the next subtask to work on.
///
/// 1. The first subtask already in `progress` (resume in-flight work).
/// 2. Otherwise the first `todo` subtask whose dependencies are all `done`
///    or `skipped`.
/// 3. Otherwise `None`: the ticket is complete or blocked.
pub fn find_next_subtask(ticket: &Ticket) -> Option<&Subtask> {
    next_index(ticket).map(|i| &ticket.subtasks[i])
}

/// Position of the subtask [`find_next_subtask`] would return.
pub fn next_index(ticket: &Ticket) -> Option<usize> {
    if let Some(i) = ticket
        .subtasks
        .iter()
        .position(|st| st.status == SubtaskStatus::Progress)
    {
        return Some(i);
    }
    ticket
        .subtasks
        .iter()
        .position(|st| st.status == SubtaskStatus::Todo && dependencies_met(ticket, st))
}

/// Every dependency names a sibling that is `done` or `skipped`.
///
/// A dependency naming no sibling is never met.
pub fn dependencies_met(ticket: &Ticket, subtask: &Subtask) -> bool {
    subtask.dependencies.iter().all(|dep| {
        ticket
            .subtask(dep.trim())
            .is_some_and(|d| d.status.satisfies_dependency())
    })
}

/// `todo` subtasks still waiting on at least one dependency, with the
/// dependencies that are not yet satisfied.
pub fn blocked_subtasks(ticket: &Ticket) -> Vec<(&Subtask, Vec<&str>)> {
    ticket
        .subtasks
        .iter()
        .filter(|st| st.status == SubtaskStatus::Todo)
        .filter_map(|st| {
            let waiting: Vec<&str> = st
                .dependencies
                .iter()
                .map(|d| d.trim())
                .filter(|d| {
                    !ticket
                        .subtask(d)
                        .is_some_and(|dep| dep.status.satisfies_dependency())
                })
                .collect();
            (!waiting.is_empty()).then_some((st, waiting))
        })
        .collect()
}
