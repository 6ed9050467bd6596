use crate::config::Config;
use crate::git::Git;
use crate::mirror::{Mirror, Report};
use crate::providers::{GitHub, GitLab, Provider, USER_AGENT};
use crate::repo::Repo;
use failure::{Error, ResultExt};
use reqwest::blocking::Client;

/// Runs a complete backup: ask every provider for its repositories, then
/// mirror them.
#[derive(Debug, Clone)]
pub struct Driver {
    config: Config,
}

impl Driver {
    pub fn with_config(config: Config) -> Driver {
        Driver { config }
    }

    pub fn run(&self) -> Result<Report, Error> {
        let providers = get_providers(&self.config)?;
        self.run_with(&providers)
    }

    /// Mirror everything the given providers know about.
    pub fn run_with(&self, providers: &[Box<dyn Provider>]) -> Result<Report, Error> {
        let repos = get_repos_from_providers(providers)?;

        if repos.is_empty() {
            info!("Nothing to back up");
            return Ok(Report::default());
        }

        let report = self.mirror().run(&repos)?;
        let report = report.into_result()?;

        Ok(report)
    }

    /// Fetch the repository list and log what a real run would do, without
    /// touching the target directory.
    pub fn dry_run(&self) -> Result<(), Error> {
        let providers = get_providers(&self.config)?;
        let repos = get_repos_from_providers(&providers)?;
        let mirror = self.mirror();

        let (jobs, rejected) = mirror.plan(&repos);

        for job in &jobs {
            info!(
                "Would {} {} ({}) at {}",
                job.action,
                job.repo.full_name(),
                job.repo.web_url,
                job.path.display()
            );
        }
        for (repo, err) in &rejected {
            warn!("Would skip {}, {}", repo.full_name(), err);
        }

        Ok(())
    }

    fn mirror(&self) -> Mirror<Git> {
        let general = &self.config.general;

        Mirror::new(&general.target, Git::new(general.git_timeout()))
            .prefixed(self.config.prefix_with_platform())
            .threads(general.threads)
    }
}

fn get_providers(cfg: &Config) -> Result<Vec<Box<dyn Provider>>, Error> {
    let mut providers: Vec<Box<dyn Provider>> = Vec::new();

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(cfg.general.http_timeout())
        .build()
        .context("Unable to create the HTTP client")?;

    if let Some(gl_config) = cfg.enabled_gitlab() {
        providers.push(Box::new(GitLab::new(gl_config.clone(), client.clone())));
    }

    if let Some(gh_config) = cfg.enabled_github() {
        providers.push(Box::new(GitHub::new(gh_config.clone(), client)));
    }

    if providers.is_empty() {
        warn!("No providers found");
    }

    Ok(providers)
}

/// Ask each provider for its repositories, in order.
///
/// A provider with no repositories is worth a warning but the others are
/// still asked. Any fetch error aborts the whole thing.
fn get_repos_from_providers(providers: &[Box<dyn Provider>]) -> Result<Vec<Repo>, Error> {
    let mut repos = Vec::new();

    for provider in providers {
        info!("Fetching repositories from {}", provider.platform());
        let found = provider
            .repositories()
            .with_context(|_| format!("Unable to fetch repositories from {}", provider.platform()))?;

        if found.is_empty() {
            warn!(
                "No repositories found for the personal access token {}",
                provider.masked_token()
            );
        } else {
            info!("Found {} repos from {}", found.len(), provider.platform());
        }

        repos.extend(found);
    }

    Ok(repos)
}
