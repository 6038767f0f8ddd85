//! Self-check suite: exercises the engine's own invariants.
//!
//! Upsert a ticket with these subtask names (see [`ticket`]) and run
//! `ticket next engine-selfcheck` to verify an installation end to end.

use crate::crypto;
use crate::models::{Subtask, SubtaskStatus, Ticket};
use crate::registry::{TestOutcome, TestRegistry};
use crate::selector::find_next_subtask;
use crate::validation::validate_ticket;
use crate::Error;

pub const TICKET_ID: &str = "engine-selfcheck";

pub fn register(registry: &TestRegistry) {
    registry
        .register_ticket(TICKET_ID)
        .add_subtask_test("vault-crypto", vault_crypto, &["vault"])
        .add_subtask_test("selector-order", selector_order, &["selector"])
        .add_subtask_test("regression-guard", regression_guard, &["validation"])
        .add_subtask_test("cycle-guard", cycle_guard, &["validation"]);
}

/// The ticket these tests belong to, with its dependency chain.
pub fn ticket() -> Ticket {
    let mut ticket = Ticket::new(TICKET_ID);
    ticket.description = "Verify the engine's crypto, selection and validation".to_string();
    ticket.subtasks = vec![
        Subtask::new("vault-crypto"),
        Subtask::new("selector-order"),
        Subtask::new("regression-guard").with_dependencies(["selector-order"]),
        Subtask::new("cycle-guard").with_dependencies(["regression-guard"]),
    ];
    ticket
}

fn vault_crypto() -> TestOutcome {
    let salt = crypto::generate_salt();
    let key = crypto::derive_key("selfcheck", &salt);
    let sealed = crypto::encrypt(&key, b"payload")?;
    if crypto::decrypt(&key, &sealed.nonce, &sealed.ciphertext)? != b"payload" {
        return Err("decrypted value differs from plaintext".into());
    }
    let wrong = crypto::derive_key("not-selfcheck", &salt);
    match crypto::decrypt(&wrong, &sealed.nonce, &sealed.ciphertext) {
        Err(Error::InvalidPassword) => Ok(()),
        Err(e) => Err(format!("wrong password gave unexpected error: {}", e).into()),
        Ok(_) => Err("wrong password decrypted successfully".into()),
    }
}

fn selector_order() -> TestOutcome {
    let mut t = Ticket::new("chain");
    t.subtasks = vec![
        Subtask::new("A").with_status(SubtaskStatus::Done),
        Subtask::new("B").with_dependencies(["A"]),
        Subtask::new("C").with_dependencies(["B"]),
    ];
    expect_next(&t, Some("B"))?;
    t.subtasks[1].status = SubtaskStatus::Done;
    expect_next(&t, Some("C"))?;
    t.subtasks[2].status = SubtaskStatus::Progress;
    t.subtasks.push(Subtask::new("D"));
    expect_next(&t, Some("C"))
}

fn expect_next(ticket: &Ticket, want: Option<&str>) -> TestOutcome {
    let got = find_next_subtask(ticket).map(|st| st.name.as_str());
    if got == want {
        Ok(())
    } else {
        Err(format!("expected next {:?}, got {:?}", want, got).into())
    }
}

fn regression_guard() -> TestOutcome {
    let mut t = Ticket::new("regress");
    let mut st = Subtask::new("a");
    st.pass_timestamp = "2026-01-01T10:00:00Z".to_string();
    st.fail_timestamp = "2026-01-01T10:00:01Z".to_string();
    t.subtasks.push(st);
    match validate_ticket(&t) {
        Err(Error::Regression { .. }) => Ok(()),
        other => Err(format!("expected a regression error, got {:?}", other).into()),
    }
}

fn cycle_guard() -> TestOutcome {
    let mut t = Ticket::new("cycle");
    t.subtasks = vec![
        Subtask::new("a").with_dependencies(["b"]),
        Subtask::new("b").with_dependencies(["a"]),
    ];
    match validate_ticket(&t) {
        Err(Error::DependencyCycle { .. }) => Ok(()),
        other => Err(format!("expected a dependency cycle error, got {:?}", other).into()),
    }
}
