//! Deciding, per repository, whether to clone or update its mirror.

use crate::errors::UpdateFailure;
use crate::git::GitOps;
use crate::repo::Repo;
use failure::{Error, Fail, ResultExt};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

/// What happens to a single repository.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing exists locally yet, make a bare clone.
    Clone,
    /// The mirror already exists, fetch and prune.
    Update,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Action::Clone => f.write_str("clone"),
            Action::Update => f.write_str("update"),
        }
    }
}

/// A repository, where its mirror lives, and what to do with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Job<'a> {
    pub repo: &'a Repo,
    pub path: PathBuf,
    pub action: Action,
}

/// The outcome of a mirror pass.
#[derive(Debug, Default)]
pub struct Report {
    pub cloned: usize,
    pub updated: usize,
    pub failures: Vec<(Repo, Error)>,
}

impl Report {
    pub fn succeeded(&self) -> usize {
        self.cloned + self.updated
    }

    /// Turn a report with failures into an error.
    pub fn into_result(self) -> Result<Report, UpdateFailure> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(UpdateFailure {
                succeeded: self.succeeded(),
                errors: self.failures,
            })
        }
    }
}

/// Reasons a repository is skipped before git is ever invoked.
#[derive(Debug, Clone, PartialEq, Fail)]
pub enum MirrorError {
    #[fail(display = "Another repository is already mirrored to {}", _0)]
    Duplicate(String),
    #[fail(display = "{:?} can't be used as a directory name", _0)]
    UnsafePath(String),
}

/// Keeps a directory of bare mirrors up to date.
#[derive(Debug, Clone)]
pub struct Mirror<G> {
    target: PathBuf,
    prefixed: bool,
    threads: usize,
    git: G,
}

impl<G: GitOps> Mirror<G> {
    pub fn new<P: Into<PathBuf>>(target: P, git: G) -> Mirror<G> {
        Mirror {
            target: target.into(),
            prefixed: true,
            threads: 1,
            git,
        }
    }

    /// Should mirror directories be prefixed with their platform?
    pub fn prefixed(mut self, prefixed: bool) -> Self {
        self.prefixed = prefixed;
        self
    }

    /// How many repositories may be cloned or updated at once.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Where `repo`'s mirror lives.
    pub fn repo_path(&self, repo: &Repo) -> PathBuf {
        self.target.join(repo.dir_name(self.prefixed))
    }

    /// Work out what needs to happen to each repository without touching
    /// anything on disk.
    ///
    /// Repositories which can't be mirrored safely are returned separately.
    pub fn plan<'a>(&self, repos: &'a [Repo]) -> (Vec<Job<'a>>, Vec<(Repo, Error)>) {
        let mut jobs = Vec::new();
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();

        for repo in repos {
            if !repo.has_safe_path() {
                rejected.push((repo.clone(), MirrorError::UnsafePath(repo.path.clone()).into()));
                continue;
            }

            let path = self.repo_path(repo);

            // case-insensitive filesystems would put both in the same place
            let key = path.to_string_lossy().to_lowercase();
            if !seen.insert(key) {
                let err = MirrorError::Duplicate(path.display().to_string());
                rejected.push((repo.clone(), err.into()));
                continue;
            }

            let action = if path.exists() {
                Action::Update
            } else {
                Action::Clone
            };

            jobs.push(Job { repo, path, action });
        }

        (jobs, rejected)
    }

    /// Clone or update every repository, carrying on past failures.
    ///
    /// Only failing to create the target directory (or the worker pool) is
    /// fatal, everything else ends up in the `Report`.
    pub fn run(&self, repos: &[Repo]) -> Result<Report, Error> {
        fs::create_dir_all(&self.target).with_context(|_| {
            format!(
                "Couldn't create the target directory ({})",
                self.target.display()
            )
        })?;

        let (jobs, rejected) = self.plan(repos);
        let mut report = Report::default();

        for (repo, err) in rejected {
            warn!("Skipping {}, {}", repo.full_name(), err);
            report.failures.push((repo, err));
        }

        info!(
            "Mirroring {} repositories into {}",
            jobs.len(),
            self.target.display()
        );

        let outcomes: Vec<Result<Action, Error>> = if self.threads > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .thread_name(|i| format!("mirror-{}", i))
                .build()
                .context("Unable to start the worker pool")?;

            pool.install(|| jobs.par_iter().map(|job| self.execute(job)).collect())
        } else {
            jobs.iter().map(|job| self.execute(job)).collect()
        };

        for (job, outcome) in jobs.iter().zip(outcomes) {
            match outcome {
                Ok(Action::Clone) => report.cloned += 1,
                Ok(Action::Update) => report.updated += 1,
                Err(e) => {
                    warn!("Mirroring {} failed, {}", job.repo.full_name(), e);
                    report.failures.push((job.repo.clone(), e));
                }
            }
        }

        info!(
            "Cloned {} and updated {} repositories, {} failed",
            report.cloned,
            report.updated,
            report.failures.len()
        );

        Ok(report)
    }

    fn execute(&self, job: &Job<'_>) -> Result<Action, Error> {
        let repo = job.repo;

        match job.action {
            Action::Update => {
                info!("Updating {} in {}", repo.full_name(), job.path.display());
                self.git
                    .update(&job.path)
                    .context("`git remote update` failed")?;
            }
            Action::Clone => {
                info!(
                    "Cloning {} ({}) to {}",
                    repo.full_name(),
                    repo.clone_url(),
                    job.path.display()
                );

                let existed = job.path.exists();

                if let Err(e) = self.git.clone_bare(repo.clone_url(), &job.path) {
                    if !existed {
                        remove_partial_clone(repo, &job.path);
                    }
                    return Err(e.context("`git clone` failed").into());
                }
            }
        }

        debug!("{} is up to date", repo.full_name());
        Ok(job.action)
    }
}

/// Don't leave a half-written mirror behind, the next run would try to
/// update it instead of cloning again.
fn remove_partial_clone(repo: &Repo, path: &Path) {
    if !path.exists() {
        return;
    }

    debug!(
        "Removing the partial clone of {} at {}",
        repo.full_name(),
        path.display()
    );

    if let Err(e) = fs::remove_dir_all(path) {
        warn!(
            "Unable to remove the partial clone of {} at {}: {}",
            repo.full_name(),
            path.display(),
            e
        );
    }
}
