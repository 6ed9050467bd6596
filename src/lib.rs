//! Mirror every repository you can see on GitLab and GitHub as a local bare
//! clone, updating the mirrors that already exist.

#[macro_use]
extern crate log;

pub mod config;
pub mod errors;
pub mod git;
pub mod mirror;
pub mod providers;

mod driver;
mod repo;

pub use crate::config::{Config, General, Layout, ProviderConfig};
pub use crate::driver::Driver;
pub use crate::errors::{exit_code, ConfigError, FetchError, UpdateFailure};
pub use crate::mirror::{Action, Mirror, Report};
pub use crate::repo::{CloneMethod, Platform, Repo};
