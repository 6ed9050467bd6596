use crate::errors::FetchError;
use crate::repo::{Platform, Repo};

mod github;
mod gitlab;
mod pagination;
#[cfg(test)]
pub(crate) mod testing;

pub use self::github::GitHub;
pub use self::gitlab::GitLab;
pub use self::pagination::{Paginated, Response, Termination, Transport, PER_PAGE};

/// The `User-Agent` sent with every API request.
pub const USER_AGENT: &str = concat!("repo-mirror/", env!("CARGO_PKG_VERSION"));

/// Something which can retrieve the repositories we want to mirror.
pub trait Provider {
    fn platform(&self) -> Platform;

    /// The access token, masked so it's safe to log.
    fn masked_token(&self) -> String;

    /// Fetch every repository visible to this provider's token, in the order
    /// the API returns them.
    fn repositories(&self) -> Result<Vec<Repo>, FetchError>;
}
