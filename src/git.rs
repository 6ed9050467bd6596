//! Shelling out to `git` to create and update bare mirrors.

use failure::{Error, Fail, ResultExt};
use std::fmt::{self, Display, Formatter};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Refspecs which make a bare clone track upstream branches and tags
/// directly, so fetching with `--prune` keeps the mirror's own refs in sync.
const MIRROR_REFSPECS: &[&str] = &["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"];

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The git operations a mirror needs.
pub trait GitOps: Sync {
    /// Create a new bare clone of `url` at `dest`.
    fn clone_bare(&self, url: &str, dest: &Path) -> Result<(), Error>;
    /// Fetch from `origin`, pruning refs which no longer exist upstream.
    fn update(&self, dest: &Path) -> Result<(), Error>;
}

/// Git operations backed by the `git` command-line program.
#[derive(Debug, Clone, PartialEq)]
pub struct Git {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl Git {
    pub fn new(timeout: Option<Duration>) -> Git {
        Git {
            program: PathBuf::from("git"),
            timeout,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        // never sit waiting for a password nobody will type
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    fn run(&self, cmd: &mut Command) -> Result<Output, Error> {
        run_with_timeout(cmd, self.timeout)
    }

    fn run_checked(&self, cmd: &mut Command) -> Result<Output, Error> {
        let output = self.run(cmd)?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(GitError::Failed(FailedCommand {
                command: describe(cmd),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
            .into())
        }
    }

    /// Make sure `origin` fetches straight into the mirror's own refs.
    fn ensure_mirror_refspecs(&self, dest: &Path) -> Result<(), Error> {
        let output = self.run(
            self.command()
                .arg("config")
                .arg("--get-all")
                .arg("remote.origin.fetch")
                .current_dir(dest),
        )?;

        let existing = String::from_utf8_lossy(&output.stdout);
        if existing.lines().any(|line| line.trim() == MIRROR_REFSPECS[0]) {
            return Ok(());
        }

        debug!("Configuring mirror refspecs for {}", dest.display());
        for refspec in MIRROR_REFSPECS {
            self.run_checked(
                self.command()
                    .arg("config")
                    .arg("--add")
                    .arg("remote.origin.fetch")
                    .arg(refspec)
                    .current_dir(dest),
            )
            .context("Unable to configure the fetch refspecs")?;
        }

        Ok(())
    }
}

impl Default for Git {
    fn default() -> Git {
        Git::new(None)
    }
}

impl GitOps for Git {
    fn clone_bare(&self, url: &str, dest: &Path) -> Result<(), Error> {
        self.run_checked(
            self.command()
                .arg("clone")
                .arg("--bare")
                .arg("--quiet")
                .arg(url)
                .arg(dest),
        )
        .context("Unable to clone the repository")?;

        self.ensure_mirror_refspecs(dest)?;

        Ok(())
    }

    fn update(&self, dest: &Path) -> Result<(), Error> {
        ensure_bare_repo(dest)?;
        self.ensure_mirror_refspecs(dest)?;

        self.run_checked(
            self.command()
                .arg("remote")
                .arg("update")
                .arg("--prune")
                .current_dir(dest),
        )
        .context("Unable to fetch upstream changes")?;

        Ok(())
    }
}

/// Check that `dir` looks like a bare git repository.
fn ensure_bare_repo(dir: &Path) -> Result<(), Error> {
    let looks_bare = dir.join("HEAD").is_file()
        && dir.join("objects").is_dir()
        && dir.join("refs").is_dir();

    if looks_bare {
        Ok(())
    } else {
        Err(GitError::NotABareRepo(dir.display().to_string()).into())
    }
}

/// Run a command to completion, killing it if it takes longer than `timeout`.
///
/// On unix the command gets its own process group and the whole group is
/// killed, so helpers git spawns (`git-remote-https`, `ssh`, `index-pack`)
/// don't outlive it. Elsewhere only the direct child is killed.
fn run_with_timeout(cmd: &mut Command, timeout: Option<Duration>) -> Result<Output, Error> {
    let command = describe(cmd);
    trace!("Running {}", command);

    new_process_group(cmd);

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|_| format!("Unable to invoke {}", command))?;

    // drain both pipes in the background so a chatty process can't fill them
    // up and block forever
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout = thread::spawn(move || read_all(stdout));
    let stderr = thread::spawn(move || read_all(stderr));

    let status = match wait(&mut child, timeout)? {
        Some(status) => status,
        None => {
            kill(&mut child);
            let _ = child.wait();
            // the reader threads finish once the last process holding the
            // pipes is gone, nobody waits for them
            return Err(GitError::TimedOut {
                command,
                after: timeout.unwrap_or_default(),
            }
            .into());
        }
    };

    let output = Output {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    };
    trace!("{} exited with {}", command, output.status);

    Ok(output)
}

#[cfg(unix)]
fn new_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    cmd.process_group(0);
}

#[cfg(not(unix))]
fn new_process_group(_cmd: &mut Command) {}

/// Kill the child and everything else in its process group.
#[cfg(unix)]
fn kill(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;

    let killed = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if killed != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn kill(child: &mut Child) {
    let _ = child.kill();
}

/// Wait for the child to exit, returning `None` if the deadline passes first.
fn wait(child: &mut Child, timeout: Option<Duration>) -> Result<Option<ExitStatus>, Error> {
    let timeout = match timeout {
        Some(t) => t,
        None => return Ok(Some(child.wait()?)),
    };

    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn read_all<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buffer = Vec::new();

    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buffer);
    }

    buffer
}

fn describe(cmd: &Command) -> String {
    let mut description = cmd.get_program().to_string_lossy().into_owned();

    for arg in cmd.get_args() {
        description.push(' ');
        description.push_str(&arg.to_string_lossy());
    }

    format!("`{}`", description)
}

#[derive(Debug, Clone, PartialEq, Fail)]
pub enum GitError {
    #[fail(display = "Not a bare git repository: {}", _0)]
    NotABareRepo(String),
    #[fail(display = "{} timed out after {:?}", command, after)]
    TimedOut { command: String, after: Duration },
    #[fail(display = "{}", _0)]
    Failed(FailedCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedCommand {
    pub command: String,
    pub status: Option<i32>,
    pub stderr: String,
}

impl Display for FailedCommand {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{} failed", self.command)?;

        if let Some(code) = self.status {
            write!(f, " with return code {}", code)?;
        }
        if !self.stderr.is_empty() {
            write!(f, ": {}", self.stderr)?;
        }

        Ok(())
    }
}
