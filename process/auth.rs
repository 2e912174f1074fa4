//! Registry login for each supported cloud.
//!
//! Each flow produces the docker config the executor reads and
//! any environment the executor needs to find credentials itself.

use kaniko_plugin_utils::{docker_config::DockerConfig, secret::SecretValue};

pub mod aws;
pub mod azure;
pub mod ecr;
pub mod gcp;

/// Environment variables handed only to the executor process.
pub type ExecutorEnv = Vec<(String, SecretValue)>;

/// The result of a registry login.
#[derive(Debug, Default)]
pub struct RegistryLogin {
    pub config: DockerConfig,
    pub envs: ExecutorEnv,
}
