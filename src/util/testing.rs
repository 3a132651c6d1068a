//! Test setup and I/O test doubles
//!
//! Used by unit tests and by the integration tests under `tests/`.

use std::collections::{BTreeMap, VecDeque};
use std::env;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Output};
use std::sync::{Mutex, Once};

use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::domain::ServiceAccount;
use crate::infrastructure::traits::{CommandRunner, Host, Prompter};

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "trace");
        }
        // global logging subscriber, used by all tracing log macros
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    debug!("INIT: Attempting logger init from testing.rs");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::ENTER)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

// ============================================================
// Command runner
// ============================================================

/// One recorded command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub dir: Option<String>,
    pub program: String,
    pub args: Vec<String>,
}

impl RecordedCall {
    /// `program arg1 arg2 ...`
    pub fn line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Command runner that records calls and succeeds unless told otherwise.
///
/// A failure rule matches when the command line contains its pattern.
#[derive(Debug, Default)]
pub struct RecordingCommandRunner {
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<Vec<(String, i32, String)>>,
    stdout: Mutex<Vec<(String, String)>>,
}

impl RecordingCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail commands containing `pattern` with `code` and `stderr`.
    pub fn fail_on(self, pattern: &str, code: i32, stderr: &str) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((pattern.to_string(), code, stderr.to_string()));
        }
        self
    }

    /// Answer commands containing `pattern` with `stdout`.
    pub fn respond(self, pattern: &str, stdout: &str) -> Self {
        if let Ok(mut responses) = self.stdout.lock() {
            responses.push((pattern.to_string(), stdout.to_string()));
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Command lines of all calls, in order.
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(RecordedCall::line).collect()
    }

    fn record(&self, dir: Option<&Path>, program: &str, args: &[&str]) -> Output {
        let call = RecordedCall {
            dir: dir.map(|d| d.to_string_lossy().to_string()),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        };
        let line = call.line();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }

        let failure = self.failures.lock().ok().and_then(|failures| {
            failures
                .iter()
                .find(|(pattern, _, _)| line.contains(pattern.as_str()))
                .cloned()
        });
        if let Some((_, code, stderr)) = failure {
            return Output {
                status: exit_status(code),
                stdout: Vec::new(),
                stderr: stderr.into_bytes(),
            };
        }

        let stdout = self
            .stdout
            .lock()
            .ok()
            .and_then(|responses| {
                responses
                    .iter()
                    .find(|(pattern, _)| line.contains(pattern.as_str()))
                    .map(|(_, out)| out.clone())
            })
            .unwrap_or_default();
        Output {
            status: exit_status(0),
            stdout: stdout.into_bytes(),
            stderr: Vec::new(),
        }
    }
}

impl CommandRunner for RecordingCommandRunner {
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        Ok(self.record(None, cmd, args))
    }

    fn run_in(&self, dir: &Path, cmd: &str, args: &[&str]) -> io::Result<Output> {
        Ok(self.record(Some(dir), cmd, args))
    }
}

fn exit_status(code: i32) -> ExitStatus {
    ExitStatus::from_raw(code << 8)
}

// ============================================================
// Host
// ============================================================

/// Host with a fixed user table.
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    users: BTreeMap<String, ServiceAccount>,
    privileged: bool,
}

impl StaticHost {
    pub fn new(privileged: bool) -> Self {
        Self {
            users: BTreeMap::new(),
            privileged,
        }
    }

    /// Add `name` with the uid/gid of the running process, so ownership
    /// changes inside a temp dir succeed.
    pub fn with_current_user(mut self, name: &str) -> Self {
        let account = ServiceAccount {
            name: name.to_string(),
            group: name.to_string(),
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        };
        self.users.insert(name.to_string(), account);
        self
    }
}

impl Host for StaticHost {
    fn lookup_user(&self, name: &str) -> io::Result<Option<ServiceAccount>> {
        Ok(self.users.get(name).cloned())
    }

    fn is_privileged(&self) -> bool {
        self.privileged
    }
}

// ============================================================
// Prompter
// ============================================================

/// Prompter answering from a script. `None` entries simulate closed input.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<Option<String>>>,
    questions: Mutex<Vec<String>>,
    rejections: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(|a| a.map(Into::into)).collect()),
            ..Self::default()
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn rejections(&self) -> Vec<String> {
        self.rejections.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, question: &str, default: Option<&str>) -> io::Result<Option<String>> {
        if let Ok(mut questions) = self.questions.lock() {
            questions.push(question.to_string());
        }
        let answer = self
            .answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .flatten();
        Ok(answer.map(|a| {
            if a.trim().is_empty() {
                default.unwrap_or_default().to_string()
            } else {
                a.trim().to_string()
            }
        }))
    }

    fn reject(&self, message: &str) {
        if let Ok(mut rejections) = self.rejections.lock() {
            rejections.push(message.to_string());
        }
    }
}

// ============================================================
// Fixtures
// ============================================================

/// Lay out a minimal Django project in `dir`: `manage.py` naming
/// `<module>.settings` and a package with `asgi.py` or `wsgi.py`.
pub fn create_django_project(dir: &Path, module: &str, asgi: bool) -> io::Result<()> {
    std::fs::create_dir_all(dir.join(module))?;
    std::fs::write(
        dir.join("manage.py"),
        format!(
            "#!/usr/bin/env python\nimport os\nimport sys\n\n\ndef main():\n    os.environ.setdefault('DJANGO_SETTINGS_MODULE', '{module}.settings')\n"
        ),
    )?;
    std::fs::write(dir.join(module).join("__init__.py"), "")?;
    std::fs::write(dir.join(module).join("settings.py"), "DEBUG = False\n")?;
    let entry = if asgi { "asgi.py" } else { "wsgi.py" };
    std::fs::write(dir.join(module).join(entry), "application = None\n")?;
    Ok(())
}
