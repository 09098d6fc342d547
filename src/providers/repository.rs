//! Source repository providers.
//!
//! A repository provider answers whether its local mirror already contains a
//! revision and can extend the mirror. Built-in providers shell out to `git`
//! and `hg` inside the mirror directory.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ProviderError;

/// Poll interval while waiting for a provider command with a timeout.
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(25);

lazy_static! {
    static ref REVISION: Regex = Regex::new(r"^[0-9A-Za-z][0-9A-Za-z._/+~^-]*$").unwrap();
}

/// Capability interface of a source repository mirror.
///
/// Implementations are shared between concurrent sync work items. Calling
/// `update` concurrently on the same mirror must be safe, or the provider
/// must serialize it itself.
pub trait RepositoryProvider: Send + Sync {
    /// Does the local mirror already contain `revision`?
    fn test_revision(&self, revision: &str) -> Result<bool, ProviderError>;

    /// Extend the local mirror (fetch/pull).
    fn update(&self) -> Result<(), ProviderError>;
}

/// Configuration a repository provider is constructed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub location: PathBuf,
    /// Kill provider commands that run longer than this.
    pub command_timeout: Option<Duration>,
}

impl RepositoryConfig {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            command_timeout: None,
        }
    }

    fn validate(&self) -> Result<(), ProviderError> {
        if !self.location.is_dir() {
            return Err(ProviderError::InvalidConfig(format!(
                "repository location {} is not a directory",
                self.location.display()
            )));
        }
        Ok(())
    }
}

/// Git mirror.
#[derive(Debug, Clone)]
pub struct GitSourceCodeProvider {
    config: RepositoryConfig,
}

impl GitSourceCodeProvider {
    pub fn new(config: &RepositoryConfig) -> Result<Self, ProviderError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
        })
    }
}

impl RepositoryProvider for GitSourceCodeProvider {
    fn test_revision(&self, revision: &str) -> Result<bool, ProviderError> {
        check_revision(revision)?;
        let object = format!("{}^{{commit}}", revision);
        let output = run_command("git", &["cat-file", "-e", &object], &self.config)?;
        Ok(output.status.success())
    }

    fn update(&self) -> Result<(), ProviderError> {
        run_checked("git", &["fetch", "--quiet"], &self.config)
    }
}

/// Mercurial mirror.
#[derive(Debug, Clone)]
pub struct HgSourceCodeProvider {
    config: RepositoryConfig,
}

impl HgSourceCodeProvider {
    pub fn new(config: &RepositoryConfig) -> Result<Self, ProviderError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
        })
    }
}

impl RepositoryProvider for HgSourceCodeProvider {
    fn test_revision(&self, revision: &str) -> Result<bool, ProviderError> {
        check_revision(revision)?;
        let output = run_command("hg", &["log", "--quiet", "-r", revision], &self.config)?;
        Ok(output.status.success())
    }

    fn update(&self) -> Result<(), ProviderError> {
        run_checked("hg", &["pull", "--quiet"], &self.config)
    }
}

/// Reject revisions that could be read as command-line options.
fn check_revision(revision: &str) -> Result<(), ProviderError> {
    if REVISION.is_match(revision) {
        Ok(())
    } else {
        Err(ProviderError::InvalidConfig(format!(
            "invalid revision {:?}",
            revision
        )))
    }
}

fn run_checked(program: &str, args: &[&str], config: &RepositoryConfig) -> Result<(), ProviderError> {
    let output = run_command(program, args, config)?;
    if output.status.success() {
        return Ok(());
    }
    Err(ProviderError::CommandFailed {
        program: program.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        status: output.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Run `program` inside the mirror, honoring the configured timeout.
fn run_command(program: &str, args: &[&str], config: &RepositoryConfig) -> Result<Output, ProviderError> {
    let io_error = |source: std::io::Error| ProviderError::Io {
        program: program.to_string(),
        source,
    };

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(&config.location)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let Some(timeout) = config.command_timeout else {
        return command.output().map_err(io_error);
    };

    let mut child = command.spawn().map_err(io_error)?;

    // Drain stderr while polling; a full pipe would keep the child from exiting.
    let stderr_reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf).map(|_| buf)
        })
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait().map_err(io_error)? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProviderError::Timeout {
                program: program.to_string(),
                secs: timeout.as_secs(),
            });
        }
        thread::sleep(COMMAND_POLL_INTERVAL);
    };

    let stderr = match stderr_reader {
        Some(reader) => reader
            .join()
            .unwrap_or_else(|_| Ok(Vec::new()))
            .map_err(io_error)?,
        None => Vec::new(),
    };

    Ok(Output {
        status,
        stdout: Vec::new(),
        stderr,
    })
}
