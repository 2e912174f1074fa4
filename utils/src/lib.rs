pub mod artifact;
pub mod constants;
pub mod digest;
pub mod docker_config;
mod macros;
pub mod output;
pub mod secret;
pub mod semver;
pub mod tagging;

#[cfg(feature = "test")]
pub mod test_utils;

use std::env;

use miette::{miette, Result};

/// Retrieves an environment variable as a `miette` result.
///
/// # Errors
/// Will error if the env variable doesn't exist or isn't valid unicode.
pub fn get_env_var<S>(key: S) -> Result<String>
where
    S: AsRef<str>,
{
    fn inner(key: &str) -> Result<String> {
        env::var(key).map_err(|e| miette!("Failed to retrieve env var '{key}': {e}"))
    }
    inner(key.as_ref())
}
