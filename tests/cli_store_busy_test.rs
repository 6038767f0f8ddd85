//! Integration tests for single-writer store access.
//!
//! While one process holds the store, a second `ticket` invocation against
//! the same file must fail with the distinct "store is busy" error.

mod common;

use common::TestEnv;
use predicates::prelude::*;
use ticketbook::storage::Store;

#[test]
fn test_second_process_gets_store_busy() {
    let env = TestEnv::new();
    env.ticket().args(["add", "feature-x"]).assert().success();

    let held = Store::open(&env.db_path()).unwrap();

    env.ticket()
        .args(["list", "-H"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("the ticket store is busy"))
        .stderr(predicate::str::contains("TICKET_DB_PATH"));

    drop(held);
    env.ticket().args(["list"]).assert().success();
}

#[test]
fn test_busy_store_is_not_corrupted() {
    let env = TestEnv::new();
    env.ticket().args(["add", "feature-x"]).assert().success();

    {
        let _held = Store::open(&env.db_path()).unwrap();
        env.ticket()
            .args(["subtask", "done", "feature-x", "init"])
            .assert()
            .failure();
    }

    let report = env.json(&["subtask", "list", "feature-x"]);
    assert_eq!(report["ticket"]["subtasks"][0]["status"], "todo");
}

#[test]
fn test_isolated_store_override_sidesteps_busy_store() {
    let env = TestEnv::new();
    env.ticket().args(["add", "feature-x"]).assert().success();
    let _held = Store::open(&env.db_path()).unwrap();

    let other = env.repo_path().join("isolated.db");
    env.ticket()
        .args(["add", "scratch", "--db", other.to_str().unwrap()])
        .assert()
        .success();
}
