//! Structural and temporal invariant checks for tickets.
//!
//! Pure functions with no I/O. The store runs [`validate_ticket`] on every
//! read and every write, so callers never observe or persist an invalid
//! ticket. The first violation found is returned.

use std::collections::HashSet;

use crate::models::graph::{DependencyGraph, unknown_dependencies};
use crate::models::{SubtaskStatus, Ticket, parse_timestamp};
use crate::{Error, Result};

/// Validate a fully loaded ticket.
///
/// Checks, in order:
/// - ticket id is non-empty
/// - every subtask name is non-empty and unique
/// - the regression invariant: a subtask may not have failed strictly after
///   it passed (only when both timestamps parse)
/// - every dependency names a sibling subtask
/// - the dependency graph is acyclic
pub fn validate_ticket(ticket: &Ticket) -> Result<()> {
    if ticket.id.trim().is_empty() {
        return Err(Error::Validation("ticket id is empty".to_string()));
    }

    let mut seen = HashSet::new();
    for (position, st) in ticket.subtasks.iter().enumerate() {
        if st.name.trim().is_empty() {
            return Err(Error::Validation(format!(
                "ticket {}: subtask at position {} has an empty name",
                ticket.id, position
            )));
        }
        if !seen.insert(st.name.as_str()) {
            return Err(Error::Validation(format!(
                "ticket {}: duplicate subtask name '{}' at position {}",
                ticket.id, st.name, position
            )));
        }

        if let (Some(passed), Some(failed)) = (
            parse_timestamp(&st.pass_timestamp),
            parse_timestamp(&st.fail_timestamp),
        ) {
            if failed > passed {
                return Err(Error::Regression {
                    ticket_id: ticket.id.clone(),
                    subtask: st.name.clone(),
                    failed_at: st.fail_timestamp.clone(),
                    passed_at: st.pass_timestamp.clone(),
                });
            }
        }
    }

    if let Some((subtask, dep)) = unknown_dependencies(&ticket.subtasks).into_iter().next() {
        return Err(Error::Validation(format!(
            "ticket {}: subtask '{}' depends on unknown subtask '{}'",
            ticket.id, subtask, dep
        )));
    }

    if let Some(cycle) = DependencyGraph::new(&ticket.subtasks).find_cycle() {
        return Err(Error::DependencyCycle {
            ticket_id: ticket.id.clone(),
            cycle,
        });
    }

    Ok(())
}

/// Parse a stored status string for a subtask, naming the offender on failure.
pub fn parse_status(ticket_id: &str, subtask: &str, raw: &str) -> Result<SubtaskStatus> {
    SubtaskStatus::parse(raw).ok_or_else(|| {
        Error::Validation(format!(
            "ticket {}: subtask {} has invalid status: {} (expected todo, progress, done, failed or skipped)",
            ticket_id, subtask, raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Subtask;

    fn ticket_with(subtasks: Vec<Subtask>) -> Ticket {
        let mut ticket = Ticket::new("feature-x");
        ticket.subtasks = subtasks;
        ticket
    }

    #[test]
    fn test_valid_ticket() {
        let ticket = ticket_with(vec![
            Subtask::new("a"),
            Subtask::new("b").with_dependencies(["a"]),
        ]);
        assert!(validate_ticket(&ticket).is_ok());
    }

    #[test]
    fn test_empty_id_rejected() {
        let ticket = Ticket::default();
        assert!(matches!(validate_ticket(&ticket), Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_subtask_name_rejected() {
        let ticket = ticket_with(vec![Subtask::new("a"), Subtask::new("")]);
        let err = validate_ticket(&ticket).unwrap_err();
        assert!(err.to_string().contains("position 1"));
    }

    #[test]
    fn test_duplicate_subtask_name_rejected() {
        let ticket = ticket_with(vec![Subtask::new("a"), Subtask::new("a")]);
        let err = validate_ticket(&ticket).unwrap_err();
        assert!(err.to_string().contains("duplicate subtask name 'a'"));
    }

    #[test]
    fn test_fail_after_pass_is_regression() {
        let mut st = Subtask::new("a");
        st.pass_timestamp = "2026-01-01T10:00:00Z".to_string();
        st.fail_timestamp = "2026-01-01T10:00:01Z".to_string();
        let err = validate_ticket(&ticket_with(vec![st])).unwrap_err();
        assert!(matches!(err, Error::Regression { ref subtask, .. } if subtask == "a"));
        assert!(err.to_string().starts_with("[REGRESSION]"));
    }

    #[test]
    fn test_fail_before_or_at_pass_is_fine() {
        let mut before = Subtask::new("a");
        before.fail_timestamp = "2026-01-01T09:00:00Z".to_string();
        before.pass_timestamp = "2026-01-01T10:00:00Z".to_string();
        let mut same = Subtask::new("b");
        same.fail_timestamp = "2026-01-01T10:00:00Z".to_string();
        same.pass_timestamp = "2026-01-01T10:00:00Z".to_string();
        assert!(validate_ticket(&ticket_with(vec![before, same])).is_ok());
    }

    #[test]
    fn test_regression_compares_instants_not_strings() {
        let mut st = Subtask::new("a");
        // 10:30 UTC passed, 11:00+02:00 (09:00 UTC) failed: not a regression
        st.pass_timestamp = "2026-01-01T10:30:00Z".to_string();
        st.fail_timestamp = "2026-01-01T11:00:00+02:00".to_string();
        assert!(validate_ticket(&ticket_with(vec![st])).is_ok());
    }

    #[test]
    fn test_unparseable_timestamps_are_ignored() {
        let mut st = Subtask::new("a");
        st.pass_timestamp = "2026-01-01T10:00:00Z".to_string();
        st.fail_timestamp = "not a time".to_string();
        assert!(validate_ticket(&ticket_with(vec![st])).is_ok());
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let ticket = ticket_with(vec![Subtask::new("a").with_dependencies(["ghost"])]);
        let err = validate_ticket(&ticket).unwrap_err();
        assert!(err.to_string().contains("unknown subtask 'ghost'"));
    }

    #[test]
    fn test_cycle_rejected() {
        let ticket = ticket_with(vec![
            Subtask::new("a").with_dependencies(["b"]),
            Subtask::new("b").with_dependencies(["a"]),
        ]);
        assert!(matches!(
            validate_ticket(&ticket),
            Err(Error::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_parse_status_names_offender() {
        let err = parse_status("t", "a", "wip").unwrap_err();
        assert!(err.to_string().contains("subtask a has invalid status: wip"));
        assert_eq!(parse_status("t", "a", "").unwrap(), SubtaskStatus::Todo);
    }
}
