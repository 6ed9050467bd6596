//! The errors encountered in this crate.

use crate::repo::Repo;
use failure::{Error, Fail};
use reqwest::StatusCode;
use std::io::{self, Write};

/// Everything went fine, or there was nothing to do.
pub const EXIT_SUCCESS: i32 = 0;
/// Something unexpected went wrong.
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INVALID_CONFIG: i32 = 2;
pub const EXIT_FETCH_FAILED: i32 = 3;
pub const EXIT_MIRROR_FAILED: i32 = 4;

/// The configuration file is missing, unreadable or invalid.
#[derive(Debug, Fail)]
pub enum ConfigError {
    #[fail(display = "Unable to read \"{}\"", path)]
    Read {
        path: String,
        #[fail(cause)]
        inner: io::Error,
    },
    #[fail(display = "Unable to parse the config")]
    Parse(#[fail(cause)] toml::de::Error),
    #[fail(display = "Missing value for \"{}\"", key)]
    Missing { key: String },
    #[fail(display = "Invalid value for \"{}\": {}", key, reason)]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn missing<K: Into<String>>(key: K) -> ConfigError {
        ConfigError::Missing { key: key.into() }
    }

    pub(crate) fn invalid<K, R>(key: K, reason: R) -> ConfigError
    where
        K: Into<String>,
        R: Into<String>,
    {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Fetching the list of repositories from a provider failed.
#[derive(Debug, Fail)]
pub enum FetchError {
    #[fail(display = "Unable to send a request to {}", url)]
    Request {
        url: String,
        #[fail(cause)]
        inner: reqwest::Error,
    },
    /// The server responded with a non-successful status code.
    #[fail(display = "Request to {} failed with {}", url, status)]
    BadResponse { url: String, status: StatusCode },
    #[fail(display = "Unable to deserialize the response from {}", url)]
    Deserialize {
        url: String,
        #[fail(cause)]
        inner: serde_json::Error,
    },
    #[fail(display = "Invalid \"{}\" header in the response from {}: {:?}", header, url, value)]
    BadHeader {
        url: String,
        header: &'static str,
        value: String,
    },
    #[fail(display = "\"{}\" is not a valid API endpoint", _0)]
    InvalidEndpoint(String),
    #[fail(display = "The access token can't be used in a request header")]
    InvalidToken,
}

/// Exit with this code when `err` (or anything it was caused by) is the
/// reason the run failed.
pub fn exit_code(err: &Error) -> i32 {
    for cause in err.iter_chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return EXIT_INVALID_CONFIG;
        }
        if cause.downcast_ref::<FetchError>().is_some() {
            return EXIT_FETCH_FAILED;
        }
        if cause.downcast_ref::<UpdateFailure>().is_some() {
            return EXIT_MIRROR_FAILED;
        }
    }

    EXIT_FAILURE
}

/// One or more repositories couldn't be mirrored.
#[derive(Debug, Fail)]
#[fail(display = "One or more errors encountered while mirroring repos")]
pub struct UpdateFailure {
    pub(crate) succeeded: usize,
    pub(crate) errors: Vec<(Repo, Error)>,
}

impl UpdateFailure {
    pub fn errors(&self) -> &[(Repo, Error)] {
        &self.errors
    }

    pub fn display<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        writeln!(
            writer,
            "There were {} errors mirroring repositories ({} succeeded)",
            self.errors.len(),
            self.succeeded,
        )?;

        for &(ref repo, ref err) in &self.errors {
            writeln!(writer, "Error: {} failed with {}", repo.full_name(), err)?;
            for cause in err.iter_causes() {
                writeln!(writer, "\tCaused By: {}", cause)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{dummy_repo, Platform};
    use failure::ResultExt;

    #[test]
    fn exit_codes_look_through_context() {
        let result: Result<(), ConfigError> = Err(ConfigError::missing("general.target"));
        let err: Error = result.context("Couldn't load the config").unwrap_err().into();
        assert_eq!(exit_code(&err), EXIT_INVALID_CONFIG);

        let err: Error = FetchError::InvalidToken.into();
        assert_eq!(exit_code(&err), EXIT_FETCH_FAILED);

        let err: Error = UpdateFailure {
            succeeded: 2,
            errors: vec![(
                dummy_repo(Platform::GitHub, "b"),
                failure::err_msg("unreachable"),
            )],
        }
        .into();
        assert_eq!(exit_code(&err), EXIT_MIRROR_FAILED);

        assert_eq!(exit_code(&failure::err_msg("boom")), EXIT_FAILURE);
    }

    #[test]
    fn update_failures_name_every_repository() {
        let update_failure = UpdateFailure {
            succeeded: 1,
            errors: vec![
                (dummy_repo(Platform::GitHub, "b"), failure::err_msg("timed out")),
                (dummy_repo(Platform::GitLab, "c"), failure::err_msg("denied")),
            ],
        };
        let mut buffer = Vec::new();

        update_failure.display(&mut buffer).unwrap();

        let got = String::from_utf8(buffer).unwrap();
        assert!(got.contains("2 errors"));
        assert!(got.contains("github:b failed with timed out"));
        assert!(got.contains("gitlab:c failed with denied"));
    }
}
