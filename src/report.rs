//! Read-only rendering of ticket state for operators.

use crate::models::{Subtask, Ticket};
use crate::selector::find_next_subtask;
use std::fmt::Write;

const RULE: &str = "---------------------------------------------------";

/// Subtask table followed by the selector's current pick in full.
pub fn render_ticket_report(ticket: &Ticket) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Subtasks for {}:", ticket.id);
    out.push_str(&render_subtask_table(ticket));

    match find_next_subtask(ticket) {
        Some(next) => {
            out.push_str("Next Subtask:\n");
            out.push_str(&render_subtask_detail(next));
        }
        None if ticket.subtasks.iter().all(|st| st.status.is_terminal()) => {
            out.push_str("No remaining subtasks.\n");
        }
        None => {
            out.push_str("No subtask is ready; remaining work is blocked on dependencies.\n");
        }
    }
    out
}

/// One `[stat]  name` row per subtask between rules.
pub fn render_subtask_table(ticket: &Ticket) -> String {
    let mut out = String::new();
    out.push_str(RULE);
    out.push('\n');
    for st in &ticket.subtasks {
        let status = st.status.as_str();
        let short = &status[..status.len().min(4)];
        let _ = writeln!(out, "[{}]      {}", short, st.name);
    }
    out.push_str(RULE);
    out.push('\n');
    out
}

/// Every field of a subtask, one per line.
pub fn render_subtask_detail(st: &Subtask) -> String {
    let mut out = String::new();
    let tags: Vec<&str> = st.tags.iter().map(String::as_str).collect();
    let _ = writeln!(out, "Name:            {}", st.name);
    let _ = writeln!(out, "Tags:            {}", tags.join(", "));
    let _ = writeln!(out, "Dependencies:    {}", st.dependencies.join(", "));
    let _ = writeln!(out, "Description:     {}", st.description);
    for (i, cond) in st.test_conditions.iter().enumerate() {
        let _ = writeln!(out, "Test-Condition-{}: {}", i + 1, cond);
    }
    if let Some(cmd) = &st.test_command {
        let _ = writeln!(out, "Test-Command:    {}", cmd);
    }
    let _ = writeln!(out, "Agent-Notes:     {}", st.agent_notes);
    let _ = writeln!(out, "Pass-Timestamp:  {}", st.pass_timestamp);
    let _ = writeln!(out, "Fail-Timestamp:  {}", st.fail_timestamp);
    let _ = writeln!(out, "Status:          {}", st.status);
    out
}
