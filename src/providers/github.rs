use super::pagination::{Paginated, Termination, Transport};
use super::Provider;
use crate::config::ProviderConfig;
use crate::errors::FetchError;
use crate::repo::{Platform, Repo};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Url;
use serde_derive::Deserialize;
use std::fmt::{self, Debug, Formatter};

/// An interface to the repositories stored on GitHub.
#[derive(Clone)]
pub struct GitHub<T> {
    cfg: ProviderConfig,
    transport: T,
}

impl<T: Transport> GitHub<T> {
    pub const DEFAULT_HOST: &'static str = "https://api.github.com";

    /// Create a new `GitHub` with the provided config.
    pub fn new(cfg: ProviderConfig, transport: T) -> GitHub<T> {
        GitHub { cfg, transport }
    }

    fn endpoint(&self) -> Result<Url, FetchError> {
        let host = self.cfg.host_or(Self::DEFAULT_HOST).trim_end_matches('/');
        let endpoint = format!("{}/user/repos", host);

        Url::parse(&endpoint).map_err(|_| FetchError::InvalidEndpoint(endpoint))
    }

    fn headers(&self) -> Result<HeaderMap, FetchError> {
        let mut auth = HeaderValue::from_str(&format!("token {}", self.cfg.token()))
            .map_err(|_| FetchError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        Ok(headers)
    }

    fn convert_repo(&self, raw: RawRepo) -> Repo {
        Repo {
            platform: Platform::GitHub,
            name: raw.name.trim().to_string(),
            path: raw.name,
            web_url: raw.html_url,
            clone_url_ssh: raw.ssh_url,
            clone_url_http: raw.clone_url,
            clone_method: self.cfg.clone_method,
        }
    }
}

impl<T: Transport> Provider for GitHub<T> {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    fn masked_token(&self) -> String {
        self.cfg.masked_token()
    }

    fn repositories(&self) -> Result<Vec<Repo>, FetchError> {
        debug!("Fetching repositories for the authenticated user");

        let pages: Paginated<'_, T, RawRepo> = Paginated::new(
            &self.transport,
            self.endpoint()?,
            self.headers()?,
            Termination::EmptyPage,
        );

        let mut repos = Vec::new();
        for page in pages {
            repos.extend(page?.into_iter().map(|raw| self.convert_repo(raw)));
        }

        debug!("{} repositories", repos.len());
        Ok(repos)
    }
}

impl<T> Debug for GitHub<T> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("GitHub")
            .field("host", &self.cfg.host)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawRepo {
    name: String,
    #[serde(default)]
    html_url: String,
    ssh_url: String,
    clone_url: String,
}
