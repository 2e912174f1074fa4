use clap::Parser;
use kaniko_plugin_process::drivers::KanikoDriver;
use kaniko_plugin_utils::{
    artifact::RegistryType,
    constants::{
        DOCKER_CONFIG_DIR, PLUGIN_PASSWORD, PLUGIN_REGISTRY, PLUGIN_USERNAME, REGISTRY_V1,
    },
    docker_config::{DockerConfig, RegistryCredentials},
    secret::SecretValue,
};
use log::{debug, trace};
use miette::{bail, Result};

use crate::plugin::{ArtifactOpts, Plugin};

use super::{BaseImageArgs, BuildArgs, LogArgs, PluginCommand};

/// Build an image with kaniko and push it to a docker registry.
#[derive(Debug, Parser)]
#[command(name = "kaniko-docker", version, about, long_about = None)]
pub struct DockerCommand {
    /// The registry to push to.
    #[arg(long, env = PLUGIN_REGISTRY, default_value = REGISTRY_V1)]
    registry: String,

    #[arg(long, env = PLUGIN_USERNAME, default_value = "")]
    username: String,

    #[arg(long, env = PLUGIN_PASSWORD, hide_env_values = true)]
    password: Option<SecretValue>,

    #[clap(flatten)]
    base_image: BaseImageArgs,

    #[clap(flatten)]
    pub build: BuildArgs,

    #[clap(flatten)]
    pub log: LogArgs,
}

impl DockerCommand {
    /// The docker config for pushing. Auth is only needed when
    /// pushing or when a username is given.
    ///
    /// # Errors
    /// Will error if any of the registry, username, or password are missing.
    pub fn docker_config(&self) -> Result<Option<DockerConfig>> {
        if self.build.no_push && self.username.is_empty() {
            debug!("Not pushing, skipping registry login");
            return Ok(None);
        }

        let password = self.password.clone().unwrap_or_default();
        if self.username.is_empty() {
            bail!("Username must be specified");
        }
        if password.is_empty() {
            bail!("Password must be specified");
        }
        if self.registry.is_empty() {
            bail!("Registry must be specified");
        }

        let mut config = DockerConfig::new();
        config.add(
            &RegistryCredentials::builder()
                .registry(&self.registry)
                .username(&self.username)
                .password(password)
                .build(),
        )?;

        if let Some(base_image) = self.base_image.credentials() {
            config.add(&base_image)?;
        }

        Ok(Some(config))
    }
}

impl PluginCommand for DockerCommand {
    fn try_run(&mut self) -> Result<()> {
        trace!("DockerCommand::try_run()");

        if let Some(config) = self.docker_config()? {
            let path = config.write_to(DOCKER_CONFIG_DIR)?;
            debug!("Wrote docker config to {}", path.display());
        }

        let build_args = self.build.build_args()?;
        let digest_file = self.build.digest_file()?;

        Plugin::builder()
            .build_opts(self.build.build_opts(&build_args, digest_file.as_deref()))
            .tag_opts(self.build.tags_opts())
            .artifact(
                ArtifactOpts::builder()
                    .registry_type(RegistryType::Docker)
                    .registry_url(&self.registry)
                    .image_name(&self.build.repo)
                    .maybe_artifact_file(self.build.artifact_file.as_deref())
                    .maybe_output_file(self.build.output_file.as_deref())
                    .build(),
            )
            .build()
            .exec::<KanikoDriver>()
    }
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::DockerCommand;

    fn parse(args: &[&str]) -> DockerCommand {
        DockerCommand::try_parse_from(std::iter::once("kaniko-docker").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn v2_registry_becomes_v1() {
        let command = parse(&[
            "--registry=https://index.docker.io/v2/",
            "--username=user",
            "--password=pass",
        ]);
        let config = command.docker_config().unwrap().unwrap();

        assert!(config.auths().contains_key("https://index.docker.io/v1/"));
    }

    #[test]
    fn no_push_skips_login() {
        let command = parse(&["--no-push"]);

        assert!(command.docker_config().unwrap().is_none());
    }

    #[test]
    fn no_push_with_username_still_logs_in() {
        let command = parse(&["--no-push", "--username=user", "--password=pass"]);

        assert!(command.docker_config().unwrap().is_some());
    }

    #[test]
    fn requires_password() {
        let command = parse(&["--username=user"]);

        let err = command.docker_config().unwrap_err();
        assert!(err.to_string().contains("Password"));
    }

    #[test]
    fn requires_username_when_pushing() {
        let command = parse(&[]);

        assert!(command.docker_config().is_err());
    }

    #[test]
    fn base_image_credentials() {
        let command = parse(&[
            "--username=user",
            "--password=pass",
            "--base-image-registry=https://mirror.example.com",
            "--base-image-username=mirror",
            "--base-image-password=secret",
        ]);
        let config = command.docker_config().unwrap().unwrap();

        assert_eq!(config.auths().len(), 2);
        assert!(config.auths().contains_key("https://mirror.example.com"));
    }
}
