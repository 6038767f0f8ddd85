//! Registry of in-process test implementations, scoped by ticket then subtask.
//!
//! The registry is an ordinary value. It is filled by an explicit bootstrap
//! call ([`crate::suites::register_all`]) and handed to whatever runs tests;
//! there is no global instance.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{Error, Result};
use tracing::{debug, warn};

/// What a test implementation returns.
pub type TestOutcome = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A registered test implementation.
pub type TestFn = Arc<dyn Fn() -> TestOutcome + Send + Sync>;

#[derive(Clone)]
pub struct RegisteredTest {
    pub name: String,
    pub tags: Vec<String>,
    func: TestFn,
}

impl std::fmt::Debug for RegisteredTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTest")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Outcome of one test when running a whole ticket's registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub name: String,
    /// `Err` carries the failure message
    pub outcome: std::result::Result<(), String>,
}

/// Process-wide map of `ticket id -> ordered subtask tests`.
#[derive(Default)]
pub struct TestRegistry {
    tickets: RwLock<BTreeMap<String, Vec<RegisteredTest>>>,
}

/// Registration handle for one ticket, returned by [`TestRegistry::register_ticket`].
pub struct TicketTests<'a> {
    registry: &'a TestRegistry,
    ticket_id: String,
}

impl TicketTests<'_> {
    /// Register a subtask's test. Registering a name twice replaces the
    /// earlier implementation.
    pub fn add_subtask_test<F>(&self, name: &str, func: F, tags: &[&str]) -> &Self
    where
        F: Fn() -> TestOutcome + Send + Sync + 'static,
    {
        let test = RegisteredTest {
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            func: Arc::new(func),
        };

        let mut tickets = self.registry.write();
        let tests = tickets.entry(self.ticket_id.clone()).or_default();
        if let Some(existing) = tests.iter_mut().find(|t| t.name == name) {
            warn!(ticket = %self.ticket_id, subtask = %name, "replacing registered test");
            *existing = test;
        } else {
            tests.push(test);
        }
        self
    }
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start registering tests for a ticket.
    pub fn register_ticket(&self, ticket_id: &str) -> TicketTests<'_> {
        self.write().entry(ticket_id.to_string()).or_default();
        TicketTests {
            registry: self,
            ticket_id: ticket_id.to_string(),
        }
    }

    /// Registered ticket ids, ascending.
    pub fn tickets(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Registered tests for a ticket, in registration order.
    pub fn tests_for(&self, ticket_id: &str) -> Vec<RegisteredTest> {
        self.read().get(ticket_id).cloned().unwrap_or_default()
    }

    pub fn is_registered(&self, ticket_id: &str, subtask: &str) -> bool {
        self.lookup(ticket_id, subtask).is_some()
    }

    /// Run one subtask's test.
    ///
    /// A test returning `Err` or panicking is reported as
    /// [`Error::Execution`] carrying its message.
    pub fn run_subtask(&self, ticket_id: &str, subtask: &str) -> Result<()> {
        let test = self
            .lookup(ticket_id, subtask)
            .ok_or_else(|| Error::TestNotRegistered {
                ticket_id: ticket_id.to_string(),
                subtask: subtask.to_string(),
            })?;

        debug!(ticket = %ticket_id, subtask = %subtask, "running registered test");
        invoke(&test).map_err(Error::Execution)
    }

    /// Run every test registered for a ticket, in registration order.
    pub fn run_all(&self, ticket_id: &str) -> Result<Vec<TestReport>> {
        let tests = self.tests_for(ticket_id);
        if tests.is_empty() {
            return Err(Error::NotFound(format!(
                "no tests registered for ticket {}",
                ticket_id
            )));
        }

        Ok(tests
            .iter()
            .map(|test| TestReport {
                name: test.name.clone(),
                outcome: invoke(test),
            })
            .collect())
    }

    fn lookup(&self, ticket_id: &str, subtask: &str) -> Option<RegisteredTest> {
        self.read()
            .get(ticket_id)
            .and_then(|tests| tests.iter().find(|t| t.name == subtask))
            .cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Vec<RegisteredTest>>> {
        self.tickets.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Vec<RegisteredTest>>> {
        self.tickets.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Call a test outside any registry lock, turning panics into failures.
fn invoke(test: &RegisteredTest) -> std::result::Result<(), String> {
    match catch_unwind(AssertUnwindSafe(|| (test.func)())) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
