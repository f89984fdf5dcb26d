use crate::error::{EnvironmentError, ToolCallError};
use log::debug;
use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Default timeout for quick introspection calls (--version, --help).
pub const HELP_TIMEOUT_SECS: u64 = 10;

/// Timeout for the CLI-tree export, the one allowed slow call.
pub const TREE_EXPORT_TIMEOUT_SECS: u64 = 120;

const STDERR_EXCERPT_CHARS: usize = 200;

/// Read-only access to the installed gcloud binary. Implementations run one
/// invocation to completion and return its stdout; anything else (spawn
/// failure, timeout, non-zero exit) is a `ToolCallError`. Tests substitute
/// stub runners with canned output.
pub trait ToolRunner {
    fn run(&self, args: &[&str], timeout: Duration) -> Result<String, ToolCallError>;

    /// First line of `gcloud --version`, e.g. "Google Cloud SDK 478.0.0".
    fn version_line(&self) -> Result<String, ToolCallError> {
        let out = self.run(&["--version"], Duration::from_secs(HELP_TIMEOUT_SECS))?;
        out.lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ToolCallError::Failed {
                argv: "gcloud --version".to_string(),
                code: Some(0),
                stderr_excerpt: "empty version output".to_string(),
            })
    }

    /// Installation root reported by `gcloud info`.
    fn sdk_root(&self) -> Result<PathBuf, ToolCallError> {
        let out = self.run(
            &["info", "--format=value(installation.sdk_root)"],
            Duration::from_secs(HELP_TIMEOUT_SECS),
        )?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Regenerates the machine-readable CLI tree into `dir`.
    fn export_tree(&self, dir: &Path) -> Result<(), ToolCallError> {
        let directory_arg = format!("--directory={}", dir.display());
        self.run(
            &["meta", "generate-cli-trees", "--commands=gcloud", &directory_arg],
            Duration::from_secs(TREE_EXPORT_TIMEOUT_SECS),
        )?;
        Ok(())
    }

    /// Help text for one command path, e.g. `["run", "services", "describe"]`.
    fn help_text(&self, path: &[String], timeout: Duration) -> Result<String, ToolCallError> {
        let mut args: Vec<&str> = path.iter().map(String::as_str).collect();
        args.push("--help");
        self.run(&args, timeout)
    }
}

impl<T: ToolRunner + ?Sized> ToolRunner for &T {
    fn run(&self, args: &[&str], timeout: Duration) -> Result<String, ToolCallError> {
        (**self).run(args, timeout)
    }
}

/// The real gcloud executable, resolved from PATH once at startup.
pub struct GcloudCli {
    program: PathBuf,
}

impl GcloudCli {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    pub fn locate() -> Result<Self, EnvironmentError> {
        let program = locate_on_path("gcloud").ok_or(EnvironmentError::ToolNotFound)?;
        debug!("using gcloud at {}", program.display());
        Ok(Self::new(program))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ToolRunner for GcloudCli {
    fn run(&self, args: &[&str], timeout: Duration) -> Result<String, ToolCallError> {
        let argv_display = format!("{} {}", self.program.display(), args.join(" "));
        debug!("running: {}", argv_display);

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| ToolCallError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        // Drain both pipes on background threads so the child cannot block on
        // a full pipe buffer before it exits.
        let stdout_thread = child.stdout.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });
        let stderr_thread = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                buf
            })
        });

        match wait_with_timeout(&mut child, timeout) {
            Ok(Some(status)) => {
                let stdout_buf = stdout_thread
                    .and_then(|t| t.join().ok())
                    .unwrap_or_default();
                let stderr_buf = stderr_thread
                    .and_then(|t| t.join().ok())
                    .unwrap_or_default();
                let stdout = String::from_utf8_lossy(&stdout_buf).to_string();
                let stderr = String::from_utf8_lossy(&stderr_buf).to_string();

                if status.success() {
                    Ok(stdout)
                } else {
                    Err(ToolCallError::Failed {
                        argv: argv_display,
                        code: status.code(),
                        stderr_excerpt: excerpt(&stderr),
                    })
                }
            }
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(ToolCallError::Timeout {
                    argv: argv_display,
                    timeout_secs: timeout.as_secs(),
                })
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(ToolCallError::Failed {
                    argv: argv_display,
                    code: None,
                    stderr_excerpt: format!("wait failed: {}", err),
                })
            }
        }
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn locate_on_path(tool: &str) -> Option<PathBuf> {
    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths).find_map(|dir| {
            let candidate = dir.join(tool);
            if candidate.is_file() {
                Some(candidate)
            } else {
                None
            }
        })
    })
}

fn excerpt(text: &str) -> String {
    text.trim().chars().take(STDERR_EXCERPT_CHARS).collect()
}
