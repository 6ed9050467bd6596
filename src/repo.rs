use serde_derive::Deserialize;
use std::fmt::{self, Display, Formatter};

/// The platforms we know how to fetch repositories from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    GitLab,
    GitHub,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::GitLab => "gitlab",
            Platform::GitHub => "github",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of a repository's URLs git should clone from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneMethod {
    Ssh,
    Http,
}

impl Display for CloneMethod {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            CloneMethod::Ssh => f.write_str("ssh"),
            CloneMethod::Http => f.write_str("http"),
        }
    }
}

/// A platform-agnostic description of a remote repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    pub platform: Platform,
    pub name: String,
    /// The provider's slug for this repository, used as the directory name.
    pub path: String,
    pub web_url: String,
    pub clone_url_ssh: String,
    pub clone_url_http: String,
    pub clone_method: CloneMethod,
}

impl Repo {
    /// The URL git should clone from, according to `clone_method`.
    pub fn clone_url(&self) -> &str {
        match self.clone_method {
            CloneMethod::Ssh => &self.clone_url_ssh,
            CloneMethod::Http => &self.clone_url_http,
        }
    }

    /// The name of this repository's mirror inside the target directory.
    ///
    /// Prefixing with the platform keeps `gitlab` and `github` repositories
    /// with the same slug apart.
    pub fn dir_name(&self, prefixed: bool) -> String {
        if prefixed {
            format!("{}_{}", self.platform, self.path)
        } else {
            self.path.clone()
        }
    }

    /// A short identifier used when logging.
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.platform, self.path)
    }

    /// Would using `path` as a directory name stay inside the target
    /// directory?
    pub fn has_safe_path(&self) -> bool {
        let path = self.path.as_str();

        !path.is_empty()
            && path != "."
            && path != ".."
            && !path.contains(|c: char| c == '/' || c == '\\')
    }
}

#[cfg(test)]
pub(crate) fn dummy_repo(platform: Platform, path: &str) -> Repo {
    Repo {
        platform,
        name: path.to_string(),
        path: path.to_string(),
        web_url: format!("https://example.com/{}", path),
        clone_url_ssh: format!("git@example.com:me/{}.git", path),
        clone_url_http: format!("https://example.com/me/{}.git", path),
        clone_method: CloneMethod::Ssh,
    }
}
