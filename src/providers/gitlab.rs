use super::pagination::{Paginated, Termination, Transport};
use super::Provider;
use crate::config::ProviderConfig;
use crate::errors::FetchError;
use crate::repo::{Platform, Repo};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Url;
use serde_derive::Deserialize;

/// The GitLab provider.
#[derive(Debug, Clone)]
pub struct GitLab<T> {
    cfg: ProviderConfig,
    transport: T,
}

impl<T: Transport> GitLab<T> {
    pub const DEFAULT_HOST: &'static str = "https://gitlab.com";
    const NEXT_PAGE_HEADER: &'static str = "x-next-page";

    pub fn new(cfg: ProviderConfig, transport: T) -> GitLab<T> {
        GitLab { cfg, transport }
    }

    fn endpoint(&self) -> Result<Url, FetchError> {
        let host = self.cfg.host_or(Self::DEFAULT_HOST).trim_end_matches('/');
        let endpoint = format!("{}/api/v4/projects", host);

        Url::parse(&endpoint).map_err(|_| FetchError::InvalidEndpoint(endpoint))
    }

    fn headers(&self) -> Result<HeaderMap, FetchError> {
        let mut token =
            HeaderValue::from_str(self.cfg.token()).map_err(|_| FetchError::InvalidToken)?;
        token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("private-token", token);
        Ok(headers)
    }

    fn convert_project(&self, raw: RawProject) -> Repo {
        Repo {
            platform: Platform::GitLab,
            name: raw.name.trim().to_string(),
            path: raw.path,
            web_url: raw.web_url,
            clone_url_ssh: raw.ssh_url_to_repo,
            clone_url_http: raw.http_url_to_repo,
            clone_method: self.cfg.clone_method,
        }
    }
}

impl<T: Transport> Provider for GitLab<T> {
    fn platform(&self) -> Platform {
        Platform::GitLab
    }

    fn masked_token(&self) -> String {
        self.cfg.masked_token()
    }

    fn repositories(&self) -> Result<Vec<Repo>, FetchError> {
        debug!("Fetching projects you are a member of");

        let pages: Paginated<'_, T, RawProject> = Paginated::new(
            &self.transport,
            self.endpoint()?,
            self.headers()?,
            Termination::NextPageHeader(Self::NEXT_PAGE_HEADER),
        )
        .with_query("membership", "true");

        let mut repos = Vec::new();
        for page in pages {
            repos.extend(page?.into_iter().map(|raw| self.convert_project(raw)));
        }

        debug!("Found {} projects", repos.len());
        Ok(repos)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawProject {
    name: String,
    path: String,
    #[serde(default)]
    web_url: String,
    ssh_url_to_repo: String,
    http_url_to_repo: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::FakeApi;
    use crate::repo::CloneMethod;
    use sec::Secret;
    use serde_json::json;

    fn config(host: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            host: host.map(String::from),
            personal_access_token: Secret::new(String::from("glpat-0123456789abcdef")),
            clone_method: CloneMethod::Http,
        }
    }

    fn project(i: usize) -> serde_json::Value {
        json!({
            "id": i,
            "name": format!("  Project {}  ", i),
            "path": format!("project-{}", i),
            "path_with_namespace": format!("me/project-{}", i),
            "web_url": format!("https://gitlab.example.com/me/project-{}", i),
            "ssh_url_to_repo": format!("git@gitlab.example.com:me/project-{}.git", i),
            "http_url_to_repo": format!("https://gitlab.example.com/me/project-{}.git", i),
        })
    }

    #[test]
    fn fetch_every_page_of_projects() {
        let api = FakeApi::with_items(250, project).next_page_header("x-next-page");
        let gitlab = GitLab::new(config(Some("https://gitlab.example.com/")), api);

        let repos = gitlab.repositories().unwrap();

        assert_eq!(repos.len(), 250);
        assert_eq!(gitlab.transport.pages_requested(), vec![1, 2, 3]);
        assert_eq!(repos[0].path, "project-0");
        assert_eq!(repos[249].path, "project-249");
    }

    #[test]
    fn projects_are_normalized() {
        let api = FakeApi::with_items(1, project).next_page_header("x-next-page");
        let gitlab = GitLab::new(config(None), api);

        let repos = gitlab.repositories().unwrap();

        let should_be = Repo {
            platform: Platform::GitLab,
            name: String::from("Project 0"),
            path: String::from("project-0"),
            web_url: String::from("https://gitlab.example.com/me/project-0"),
            clone_url_ssh: String::from("git@gitlab.example.com:me/project-0.git"),
            clone_url_http: String::from("https://gitlab.example.com/me/project-0.git"),
            clone_method: CloneMethod::Http,
        };
        assert_eq!(repos, vec![should_be]);
    }

    #[test]
    fn requests_are_authenticated_membership_queries() {
        let api = FakeApi::with_items(1, project).next_page_header("x-next-page");
        let gitlab = GitLab::new(config(Some("https://gitlab.example.com")), api);

        gitlab.repositories().unwrap();

        let requests = gitlab.transport.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.url.path(), "/api/v4/projects");
        assert_eq!(req.url.host_str(), Some("gitlab.example.com"));
        assert!(req.url.query().unwrap().contains("membership=true"));
        assert_eq!(req.headers["private-token"], "glpat-0123456789abcdef");
    }

    #[test]
    fn no_projects_is_not_an_error() {
        let api = FakeApi::with_items(0, project).next_page_header("x-next-page");
        let gitlab = GitLab::new(config(None), api);

        let repos = gitlab.repositories().unwrap();

        assert!(repos.is_empty());
        assert_eq!(gitlab.transport.pages_requested(), vec![1]);
    }

    #[test]
    fn server_errors_are_fatal() {
        let api = FakeApi::with_items(250, project)
            .next_page_header("x-next-page")
            .fail_on_page(3);
        let gitlab = GitLab::new(config(None), api);

        let err = gitlab.repositories().unwrap_err();

        assert!(matches!(err, FetchError::BadResponse { .. }));
    }

    #[test]
    fn the_token_is_masked() {
        let gitlab = GitLab::new(config(None), FakeApi::default());

        assert_eq!(gitlab.masked_token(), "**************89abcdef");
    }
}
