//! Test execution and the "what's next" driver loop.
//!
//! The driver never calls test code in its own process. [`ProcessExecutor`]
//! re-executes the current binary with the hidden `__harness` subcommand,
//! which bootstraps a fresh [`TestRegistry`] and runs exactly one subtask
//! (or a whole ticket). A subtask with a `test_command` runs that command
//! through `sh -c` instead.
//!
//! The store is opened per step and closed while a test runs, so the child
//! may use the same store file.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

use crate::models::{LogEntry, Subtask, SubtaskStatus, Ticket, now_rfc3339};
use crate::registry::TestRegistry;
use crate::selector::next_index;
use crate::storage::Store;
use crate::{DB_PATH_ENV, Error, Result};

/// Hidden subcommand the isolated child runs.
pub const HARNESS_COMMAND: &str = "__harness";

/// How often a waiting parent checks the timeout and cancellation flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a test run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Termination {
    Exited { code: Option<i32> },
    TimedOut { after_secs: u64 },
    Cancelled,
}

/// Result of running one test (or one ticket's tests).
#[derive(Debug, Clone, Serialize)]
pub struct TestRun {
    pub passed: bool,
    /// Captured stdout followed by stderr
    pub output: String,
    pub duration_ms: u64,
    pub termination: Termination,
}

impl TestRun {
    pub fn passed(output: impl Into<String>, duration: Duration) -> Self {
        Self {
            passed: true,
            output: output.into(),
            duration_ms: duration.as_millis() as u64,
            termination: Termination::Exited { code: Some(0) },
        }
    }

    pub fn failed(output: impl Into<String>, duration: Duration, code: Option<i32>) -> Self {
        Self {
            passed: false,
            output: output.into(),
            duration_ms: duration.as_millis() as u64,
            termination: Termination::Exited { code },
        }
    }

    /// Failure text recorded as the subtask's note. Empty for a pass.
    pub fn detail(&self) -> String {
        if self.passed {
            return String::new();
        }
        let output = self.output.trim();
        match self.termination {
            Termination::TimedOut { after_secs } if output.is_empty() => {
                format!("timed out after {}s", after_secs)
            }
            Termination::TimedOut { after_secs } => {
                format!("timed out after {}s\n{}", after_secs, output)
            }
            Termination::Cancelled => "cancelled".to_string(),
            Termination::Exited { code } if output.is_empty() => match code {
                Some(code) => format!("test exited with status {}", code),
                None => "test terminated by a signal".to_string(),
            },
            Termination::Exited { .. } => output.to_string(),
        }
    }
}

/// Runs subtask tests on behalf of the driver.
pub trait Executor {
    /// Run one subtask's test.
    ///
    /// An `Err` means the test could not be started; the driver records it
    /// as a failure like any other.
    fn run_subtask(&self, ticket_id: &str, subtask: &Subtask) -> Result<TestRun>;

    /// Run every registered test for a ticket.
    fn run_ticket(&self, ticket_id: &str) -> Result<TestRun>;

    /// Whether the operator asked to stop.
    fn is_cancelled(&self) -> bool {
        false
    }
}

// === Process isolation ===

/// Runs each test in a child process with a timeout and cancellation.
pub struct ProcessExecutor {
    program: PathBuf,
    store_path: PathBuf,
    workdir: PathBuf,
    timeout: Duration,
    cancel: Arc<AtomicBool>,
}

impl ProcessExecutor {
    /// Executor re-running the current binary as the harness.
    pub fn new(store_path: &Path, workdir: &Path, timeout: Duration) -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| Error::Execution(format!("cannot locate own executable: {}", e)))?;
        Ok(Self::with_program(program, store_path, workdir, timeout))
    }

    pub fn with_program(
        program: PathBuf,
        store_path: &Path,
        workdir: &Path,
        timeout: Duration,
    ) -> Self {
        // The child runs in `workdir`, so a relative store path must not leak through
        let store_path =
            std::path::absolute(store_path).unwrap_or_else(|_| store_path.to_path_buf());
        Self {
            program,
            store_path,
            workdir: workdir.to_path_buf(),
            timeout,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that, once set, kills the running child and stops the driver.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn harness_command(&self, ticket_id: &str, subtask: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(HARNESS_COMMAND).arg(ticket_id);
        if let Some(name) = subtask {
            cmd.arg(name);
        }
        cmd
    }

    fn shell_command(&self, ticket_id: &str, subtask: &Subtask, script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(script)
            .env("TICKET_ID", ticket_id)
            .env("TICKET_SUBTASK", &subtask.name);
        cmd
    }

    fn execute(&self, mut cmd: Command) -> Result<TestRun> {
        cmd.env(DB_PATH_ENV, &self.store_path)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so the whole tree can be killed on timeout
            cmd.process_group(0);
        }

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Execution(format!("failed to start test process: {}", e)))?;
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let termination = loop {
            match child.wait_timeout(POLL_INTERVAL)? {
                Some(status) => break Termination::Exited { code: status.code() },
                None if self.cancel.load(Ordering::SeqCst) => {
                    warn!("cancelling running test");
                    kill_tree(&mut child);
                    break Termination::Cancelled;
                }
                None if started.elapsed() >= self.timeout => {
                    warn!(timeout_secs = self.timeout.as_secs(), "test timed out");
                    kill_tree(&mut child);
                    break Termination::TimedOut {
                        after_secs: self.timeout.as_secs(),
                    };
                }
                None => {}
            }
        };

        let mut output = join_reader(stdout);
        let err = join_reader(stderr);
        if !err.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&err);
        }

        let passed = termination == Termination::Exited { code: Some(0) };
        Ok(TestRun {
            passed,
            output,
            duration_ms: started.elapsed().as_millis() as u64,
            termination,
        })
    }
}

impl Executor for ProcessExecutor {
    fn run_subtask(&self, ticket_id: &str, subtask: &Subtask) -> Result<TestRun> {
        let cmd = match subtask.test_command.as_deref() {
            Some(script) => {
                debug!(ticket = %ticket_id, subtask = %subtask.name, "running test command");
                self.shell_command(ticket_id, subtask, script)
            }
            None => {
                debug!(ticket = %ticket_id, subtask = %subtask.name, "running harness");
                self.harness_command(ticket_id, Some(&subtask.name))
            }
        };
        self.execute(cmd)
    }

    fn run_ticket(&self, ticket_id: &str) -> Result<TestRun> {
        self.execute(self.harness_command(ticket_id, None))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> Option<JoinHandle<String>> {
    source.map(|mut r| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Kill the child and, on Unix, every process in its group.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;
        let pgid = child.id() as i32;
        if let Err(e) = kill(Pid::from_raw(-pgid), Signal::SIGKILL) {
            debug!(error = %e, "process group kill failed");
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

// === In-process execution ===

/// Runs registered tests directly in this process.
///
/// Used by the harness child itself; `test_command` is not consulted.
pub struct RegistryExecutor<'a> {
    registry: &'a TestRegistry,
}

impl<'a> RegistryExecutor<'a> {
    pub fn new(registry: &'a TestRegistry) -> Self {
        Self { registry }
    }
}

impl Executor for RegistryExecutor<'_> {
    fn run_subtask(&self, ticket_id: &str, subtask: &Subtask) -> Result<TestRun> {
        let started = Instant::now();
        match self.registry.run_subtask(ticket_id, &subtask.name) {
            Ok(()) => Ok(TestRun::passed("", started.elapsed())),
            Err(Error::Execution(msg)) => Ok(TestRun::failed(msg, started.elapsed(), Some(1))),
            Err(e) => Err(e),
        }
    }

    fn run_ticket(&self, ticket_id: &str) -> Result<TestRun> {
        let started = Instant::now();
        let reports = self.registry.run_all(ticket_id)?;
        let mut output = String::new();
        let mut passed = true;
        for report in &reports {
            match &report.outcome {
                Ok(()) => output.push_str(&format!("ok      {}\n", report.name)),
                Err(msg) => {
                    passed = false;
                    output.push_str(&format!("FAILED  {}: {}\n", report.name, msg));
                }
            }
        }
        Ok(if passed {
            TestRun::passed(output, started.elapsed())
        } else {
            TestRun::failed(output, started.elapsed(), Some(1))
        })
    }
}

// === Driver ===

/// One subtask run by the driver.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub subtask: String,
    pub passed: bool,
    pub timestamp: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

/// Why the driver loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every subtask is done, failed or skipped
    Complete,
    /// Remaining `todo` subtasks wait on unmet dependencies
    Blocked,
    /// A subtask's test failed
    Failed,
    /// The operator interrupted the run
    Cancelled,
}

/// Result of [`run_next`].
#[derive(Debug, Clone, Serialize)]
pub struct NextRun {
    pub ticket_id: String,
    pub steps: Vec<StepOutcome>,
    pub stopped: StopReason,
    /// Ticket state after the last step
    pub ticket: Ticket,
}

/// Drive a ticket: pick ready work, run it in isolation, record, continue
/// until nothing is ready or a test fails.
///
/// `ticket_id` defaults to the current ticket.
pub fn run_next<E: Executor + ?Sized>(
    store_path: &Path,
    ticket_id: Option<&str>,
    executor: &E,
) -> Result<NextRun> {
    let ticket_id = match ticket_id {
        Some(id) => id.to_string(),
        None => Store::open(store_path)?.get_current_ticket_id()?,
    };
    info!(ticket = %ticket_id, "driving ticket");

    let mut steps = Vec::new();
    loop {
        let subtask = {
            let mut store = Store::open(store_path)?;
            let mut ticket = store.get_ticket(&ticket_id)?;
            let Some(idx) = next_index(&ticket) else {
                let stopped = if ticket.subtasks.iter().all(|st| st.status.is_terminal()) {
                    StopReason::Complete
                } else {
                    StopReason::Blocked
                };
                return Ok(NextRun {
                    ticket_id,
                    steps,
                    stopped,
                    ticket,
                });
            };
            if ticket.subtasks[idx].status == SubtaskStatus::Todo {
                ticket.subtasks[idx].status = SubtaskStatus::Progress;
                store.save_ticket(&ticket)?;
            }
            ticket.subtasks[idx].clone()
        };

        let step = run_and_record(store_path, &ticket_id, &subtask, executor)?;
        let passed = step.passed;
        steps.push(step);

        if !passed {
            let stopped = if executor.is_cancelled() {
                StopReason::Cancelled
            } else {
                StopReason::Failed
            };
            let ticket = Store::open(store_path)?.get_ticket(&ticket_id)?;
            return Ok(NextRun {
                ticket_id,
                steps,
                stopped,
                ticket,
            });
        }
    }
}

/// Run one named subtask's test and record the outcome.
pub fn run_single<E: Executor + ?Sized>(
    store_path: &Path,
    ticket_id: &str,
    subtask_name: &str,
    executor: &E,
) -> Result<StepOutcome> {
    let subtask = {
        let mut ticket = Store::open(store_path)?.get_ticket(ticket_id)?;
        ticket.require_subtask_mut(subtask_name)?.clone()
    };
    run_and_record(store_path, ticket_id, &subtask, executor)
}

/// Run every registered test for a ticket. Records a log entry only.
pub fn run_ticket_tests<E: Executor + ?Sized>(
    store_path: &Path,
    ticket_id: &str,
    executor: &E,
) -> Result<TestRun> {
    Store::open(store_path)?.get_ticket(ticket_id)?;
    let run = executor.run_ticket(ticket_id)?;

    let mut store = Store::open(store_path)?;
    store.append_log(&LogEntry {
        ticket_id: ticket_id.to_string(),
        timestamp: now_rfc3339(),
        entry_type: "test".to_string(),
        message: if run.passed {
            format!("all tests passed in {}ms", run.duration_ms)
        } else {
            format!("ticket tests failed: {}", first_line(&run.detail()))
        },
        subtask: None,
    })?;
    Ok(run)
}

/// Execute a subtask's test with the store closed, then reopen and record.
fn run_and_record<E: Executor + ?Sized>(
    store_path: &Path,
    ticket_id: &str,
    subtask: &Subtask,
    executor: &E,
) -> Result<StepOutcome> {
    let run = if executor.is_cancelled() {
        TestRun {
            passed: false,
            output: String::new(),
            duration_ms: 0,
            termination: Termination::Cancelled,
        }
    } else {
        executor.run_subtask(ticket_id, subtask).unwrap_or_else(|e| {
            warn!(subtask = %subtask.name, error = %e, "test could not be run");
            TestRun::failed(e.to_string(), Duration::ZERO, None)
        })
    };

    let now = now_rfc3339();
    let detail = run.detail();

    let mut store = Store::open(store_path)?;
    let mut ticket = store.get_ticket(ticket_id)?;
    let st = ticket.require_subtask_mut(&subtask.name)?;
    if run.passed {
        st.mark_passed(&now);
    } else {
        st.mark_failed(&now, &detail);
    }
    store.save_ticket(&ticket)?;
    store.append_log(&LogEntry {
        ticket_id: ticket_id.to_string(),
        timestamp: now.clone(),
        entry_type: "test".to_string(),
        message: if run.passed {
            format!("passed in {}ms", run.duration_ms)
        } else {
            format!("failed: {}", first_line(&detail))
        },
        subtask: Some(subtask.name.clone()),
    })?;

    info!(
        ticket = %ticket_id,
        subtask = %subtask.name,
        passed = run.passed,
        duration_ms = run.duration_ms,
        "recorded test result"
    );
    Ok(StepOutcome {
        subtask: subtask.name.clone(),
        passed: run.passed,
        timestamp: now,
        duration_ms: run.duration_ms,
        detail,
    })
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suites::{register_all, selfcheck};
    use std::cell::RefCell;
    use std::collections::HashSet;
    use tempfile::TempDir;

    /// Executor scripted by subtask name; records the order it was called in.
    struct ScriptedExecutor {
        failing: HashSet<String>,
        calls: RefCell<Vec<String>>,
        store_path: PathBuf,
    }

    impl ScriptedExecutor {
        fn new(store_path: &Path, failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                calls: RefCell::new(Vec::new()),
                store_path: store_path.to_path_buf(),
            }
        }
    }

    impl Executor for ScriptedExecutor {
        fn run_subtask(&self, _ticket_id: &str, subtask: &Subtask) -> Result<TestRun> {
            // The store must be free while a test runs
            drop(Store::open(&self.store_path)?);
            self.calls.borrow_mut().push(subtask.name.clone());
            if self.failing.contains(&subtask.name) {
                Ok(TestRun::failed("assertion failed: left == right", Duration::ZERO, Some(1)))
            } else {
                Ok(TestRun::passed("", Duration::ZERO))
            }
        }

        fn run_ticket(&self, _ticket_id: &str) -> Result<TestRun> {
            Ok(TestRun::passed("", Duration::ZERO))
        }
    }

    fn setup(ticket: &Ticket) -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tickets.db");
        let mut store = Store::open(&path).unwrap();
        store.save_ticket(ticket).unwrap();
        store.set_current_ticket(&ticket.id).unwrap();
        (temp_dir, path)
    }

    fn two_step_ticket() -> Ticket {
        let mut t = Ticket::new("flow");
        t.subtasks = vec![
            Subtask::new("t1"),
            Subtask::new("t2").with_dependencies(["t1"]),
        ];
        t
    }

    #[test]
    fn test_run_next_continues_until_nothing_ready() {
        let (_temp_dir, path) = setup(&two_step_ticket());
        let executor = ScriptedExecutor::new(&path, &[]);

        let run = run_next(&path, None, &executor).unwrap();

        assert_eq!(*executor.calls.borrow(), vec!["t1", "t2"]);
        assert_eq!(run.stopped, StopReason::Complete);
        assert!(run.steps.iter().all(|s| s.passed));
        for st in &run.ticket.subtasks {
            assert_eq!(st.status, SubtaskStatus::Done);
            assert!(!st.pass_timestamp.is_empty());
        }
    }

    #[test]
    fn test_run_next_stops_on_failure() {
        let (_temp_dir, path) = setup(&two_step_ticket());
        let executor = ScriptedExecutor::new(&path, &["t1"]);

        let run = run_next(&path, Some("flow"), &executor).unwrap();

        assert_eq!(*executor.calls.borrow(), vec!["t1"]);
        assert_eq!(run.stopped, StopReason::Failed);
        let t1 = run.ticket.subtask("t1").unwrap();
        assert_eq!(t1.status, SubtaskStatus::Failed);
        assert_eq!(t1.agent_notes, "assertion failed: left == right");
        assert!(!t1.fail_timestamp.is_empty());
        assert_eq!(run.ticket.subtask("t2").unwrap().status, SubtaskStatus::Todo);
    }

    #[test]
    fn test_run_next_resumes_progress_first() {
        let mut ticket = two_step_ticket();
        ticket.subtasks.push(Subtask::new("side").with_status(SubtaskStatus::Progress));
        let (_temp_dir, path) = setup(&ticket);
        let executor = ScriptedExecutor::new(&path, &[]);

        run_next(&path, None, &executor).unwrap();

        assert_eq!(*executor.calls.borrow(), vec!["side", "t1", "t2"]);
    }

    #[test]
    fn test_run_next_reports_blocked() {
        let mut ticket = two_step_ticket();
        ticket.subtasks[0].status = SubtaskStatus::Failed;
        let (_temp_dir, path) = setup(&ticket);
        let executor = ScriptedExecutor::new(&path, &[]);

        let run = run_next(&path, None, &executor).unwrap();

        assert!(run.steps.is_empty());
        assert_eq!(run.stopped, StopReason::Blocked);
    }

    #[test]
    fn test_run_next_records_log_entries() {
        let (_temp_dir, path) = setup(&two_step_ticket());
        run_next(&path, None, &ScriptedExecutor::new(&path, &["t2"])).unwrap();

        let logs = Store::open(&path).unwrap().get_log_entries("flow").unwrap();
        let messages: Vec<(Option<&str>, &str)> = logs
            .iter()
            .map(|l| (l.subtask.as_deref(), l.message.as_str()))
            .collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, Some("t1"));
        assert!(messages[0].1.starts_with("passed"));
        assert_eq!(messages[1], (Some("t2"), "failed: assertion failed: left == right"));
    }

    #[test]
    fn test_run_single_records_outcome() {
        let (_temp_dir, path) = setup(&two_step_ticket());
        let executor = ScriptedExecutor::new(&path, &[]);

        let step = run_single(&path, "flow", "t2", &executor).unwrap();
        assert!(step.passed);
        let ticket = Store::open(&path).unwrap().get_ticket("flow").unwrap();
        assert_eq!(ticket.subtask("t2").unwrap().status, SubtaskStatus::Done);

        assert!(matches!(
            run_single(&path, "flow", "ghost", &executor),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_registry_executor_drives_selfcheck_ticket() {
        let (_temp_dir, path) = setup(&selfcheck::ticket());
        let registry = TestRegistry::new();
        register_all(&registry);

        let run = run_next(&path, None, &RegistryExecutor::new(&registry)).unwrap();

        assert_eq!(run.stopped, StopReason::Complete);
        let order: Vec<&str> = run.steps.iter().map(|s| s.subtask.as_str()).collect();
        assert_eq!(
            order,
            vec!["vault-crypto", "selector-order", "regression-guard", "cycle-guard"]
        );
    }

    #[test]
    fn test_registry_executor_unregistered_is_recorded_failure() {
        let (_temp_dir, path) = setup(&two_step_ticket());
        let registry = TestRegistry::new();

        let run = run_next(&path, None, &RegistryExecutor::new(&registry)).unwrap();

        assert_eq!(run.stopped, StopReason::Failed);
        assert_eq!(
            run.ticket.subtask("t1").unwrap().agent_notes,
            "test not registered: flow/t1"
        );
    }

    #[test]
    fn test_detail_texts() {
        let timed_out = TestRun {
            passed: false,
            output: String::new(),
            duration_ms: 2000,
            termination: Termination::TimedOut { after_secs: 2 },
        };
        assert_eq!(timed_out.detail(), "timed out after 2s");
        assert_eq!(
            TestRun::failed("", Duration::ZERO, Some(3)).detail(),
            "test exited with status 3"
        );
        assert_eq!(TestRun::passed("noise", Duration::ZERO).detail(), "");
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        fn shell_subtask(script: &str) -> Subtask {
            let mut st = Subtask::new("sh");
            st.test_command = Some(script.to_string());
            st
        }

        fn executor(dir: &Path, timeout: Duration) -> ProcessExecutor {
            ProcessExecutor::with_program(
                PathBuf::from("/nonexistent/ticket"),
                &dir.join("tickets.db"),
                dir,
                timeout,
            )
        }

        #[test]
        fn test_shell_command_pass_and_fail() {
            let dir = TempDir::new().unwrap();
            let exec = executor(dir.path(), Duration::from_secs(30));

            let ok = exec.run_subtask("t", &shell_subtask("echo fine")).unwrap();
            assert!(ok.passed);
            assert_eq!(ok.output.trim(), "fine");

            let bad = exec
                .run_subtask("t", &shell_subtask("echo out; echo broke >&2; exit 3"))
                .unwrap();
            assert!(!bad.passed);
            assert_eq!(bad.termination, Termination::Exited { code: Some(3) });
            assert_eq!(bad.detail(), "out\nbroke");
        }

        #[test]
        fn test_shell_command_sees_ticket_env() {
            let dir = TempDir::new().unwrap();
            let exec = executor(dir.path(), Duration::from_secs(30));
            let run = exec
                .run_subtask("feature-x", &shell_subtask("echo $TICKET_ID/$TICKET_SUBTASK"))
                .unwrap();
            assert_eq!(run.output.trim(), "feature-x/sh");
        }

        #[test]
        fn test_timeout_kills_child() {
            let dir = TempDir::new().unwrap();
            let exec = executor(dir.path(), Duration::from_secs(1));
            let started = Instant::now();
            let run = exec.run_subtask("t", &shell_subtask("sleep 30")).unwrap();
            assert!(started.elapsed() < Duration::from_secs(10));
            assert!(!run.passed);
            assert_eq!(run.termination, Termination::TimedOut { after_secs: 1 });
            assert!(run.detail().starts_with("timed out after 1s"));
        }

        #[test]
        fn test_cancel_flag_stops_child() {
            let dir = TempDir::new().unwrap();
            let exec = executor(dir.path(), Duration::from_secs(30));
            exec.cancel_flag().store(true, Ordering::SeqCst);
            let run = exec.run_subtask("t", &shell_subtask("sleep 30")).unwrap();
            assert_eq!(run.termination, Termination::Cancelled);
            assert_eq!(run.detail(), "cancelled");
            assert!(exec.is_cancelled());
        }

        #[test]
        fn test_missing_harness_binary_is_an_error() {
            let dir = TempDir::new().unwrap();
            let exec = executor(dir.path(), Duration::from_secs(30));
            let err = exec.run_subtask("t", &Subtask::new("a")).unwrap_err();
            assert!(matches!(err, Error::Execution(_)));
        }
    }
}
