use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::Parser;
use kaniko_plugin_process::{
    auth::{
        aws::AwsSession,
        ecr::{aws_region, EcrAuth},
        RegistryLogin,
    },
    drivers::{opts::BuildOpts, KanikoDriver},
};
use kaniko_plugin_utils::{
    artifact::RegistryType,
    constants::{
        DOCKER_CONFIG_DIR, KANIKO_VERSION, PLUGIN_ACCESS_KEY, PLUGIN_ASSUME_ROLE,
        PLUGIN_AUTHORIZATION_TOKEN, PLUGIN_CREATE_REPOSITORY, PLUGIN_EXTERNAL_ID,
        PLUGIN_LIFECYCLE_POLICY, PLUGIN_PASSWORD, PLUGIN_REGION, PLUGIN_REGISTRY,
        PLUGIN_REPOSITORY_POLICY, PLUGIN_SECRET_KEY, PLUGIN_USERNAME,
    },
    docker_config::RegistryCredentials,
    secret::SecretValue,
};
use log::{debug, trace};
use miette::{IntoDiagnostic, Result, WrapErr};

use crate::plugin::{ArtifactOpts, Plugin};

use super::{with_registry, BuildArgs, LogArgs, PluginCommand};

/// Build an image with kaniko and push it to Amazon ECR.
#[derive(Debug, Parser)]
#[command(name = "kaniko-ecr", version, about, long_about = None)]
pub struct EcrCommand {
    /// The ECR registry, like `<account>.dkr.ecr.<region>.amazonaws.com`.
    #[arg(long, env = PLUGIN_REGISTRY, default_value = "")]
    registry: String,

    #[arg(long, env = PLUGIN_REGION, default_value = "")]
    region: String,

    #[arg(long, env = PLUGIN_ACCESS_KEY, default_value = "")]
    access_key: String,

    #[arg(long, env = PLUGIN_SECRET_KEY, hide_env_values = true)]
    secret_key: Option<SecretValue>,

    /// A pre-fetched ECR authorization token.
    #[arg(long, env = PLUGIN_AUTHORIZATION_TOKEN, hide_env_values = true)]
    authorization_token: Option<SecretValue>,

    /// Docker Hub username for pulling base images.
    #[arg(long, env = PLUGIN_USERNAME, default_value = "")]
    docker_username: String,

    #[arg(long, env = PLUGIN_PASSWORD, hide_env_values = true)]
    docker_password: Option<SecretValue>,

    /// The version of the executor in the image.
    #[arg(long, env = KANIKO_VERSION, default_value = "")]
    kaniko_version: String,

    /// The ARN of a role to assume for the registry login.
    #[arg(long, env = PLUGIN_ASSUME_ROLE, default_value = "")]
    assume_role: String,

    /// The external id required by the assumed role's trust policy.
    #[arg(long, env = PLUGIN_EXTERNAL_ID, default_value = "")]
    external_id: String,

    /// Create the repository before pushing to it.
    #[arg(long, env = PLUGIN_CREATE_REPOSITORY)]
    create_repository: bool,

    /// A lifecycle policy file applied to the repository.
    #[arg(long, env = PLUGIN_LIFECYCLE_POLICY)]
    lifecycle_policy: Option<PathBuf>,

    /// A repository policy file applied to the repository.
    #[arg(long, env = PLUGIN_REPOSITORY_POLICY)]
    repository_policy: Option<PathBuf>,

    #[clap(flatten)]
    pub build: BuildArgs,

    #[clap(flatten)]
    pub log: LogArgs,
}

impl EcrCommand {
    /// Builds the ECR login.
    ///
    /// # Errors
    /// Will error if the registry is missing or the token is invalid.
    pub fn login(&self, role_credentials: Option<&RegistryCredentials>) -> Result<RegistryLogin> {
        EcrAuth::builder()
            .registry(&self.registry)
            .region(&self.region)
            .access_key(&self.access_key)
            .maybe_secret_key(self.secret_key.as_ref())
            .maybe_authorization_token(self.authorization_token.as_ref())
            .docker_username(&self.docker_username)
            .maybe_docker_password(self.docker_password.as_ref())
            .kaniko_version(&self.kaniko_version)
            .no_push(self.build.no_push)
            .maybe_role_credentials(role_credentials)
            .build()
            .login()
    }

    fn aws_session(&self) -> AwsSession<'_> {
        AwsSession::builder()
            .region(aws_region(&self.registry, &self.region))
            .access_key(&self.access_key)
            .maybe_secret_key(self.secret_key.as_ref())
            .build()
    }

    /// Creates the repository and applies its policies.
    fn prepare_repository(&self, session: &AwsSession) -> Result<()> {
        if !self.build.no_push && self.create_repository {
            session.create_repository(&self.registry, &self.build.repo)?;
        }

        if let Some(path) = self.lifecycle_policy.as_deref() {
            session.put_lifecycle_policy(&self.build.repo, &read_policy(path)?)?;
        }

        if let Some(path) = self.repository_policy.as_deref() {
            session.set_repository_policy(&self.registry, &self.build.repo, &read_policy(path)?)?;
        }

        Ok(())
    }
}

fn read_policy(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read policy file {}", path.display()))
}

impl PluginCommand for EcrCommand {
    fn try_run(&mut self) -> Result<()> {
        trace!("EcrCommand::try_run()");

        let session = self.aws_session();
        let role_credentials = if self.assume_role.is_empty() {
            None
        } else {
            Some(session.assume_role_login(&self.assume_role, &self.external_id)?)
        };

        let login = self.login(role_credentials.as_ref())?;
        let path = login.config.write_to(DOCKER_CONFIG_DIR)?;
        debug!("Wrote docker config to {}", path.display());

        self.prepare_repository(&session)?;

        let build_args = self.build.build_args()?;
        let digest_file = self.build.digest_file()?;
        let repo = with_registry(&self.registry, &self.build.repo);
        let cache_repo = self
            .build
            .cache_repo
            .as_deref()
            .map(|cache_repo| with_registry(&self.registry, cache_repo));

        Plugin::builder()
            .build_opts(BuildOpts {
                repo: repo.into(),
                cache_repo: cache_repo.map(Into::into),
                envs: &login.envs,
                ..self.build.build_opts(&build_args, digest_file.as_deref())
            })
            .tag_opts(self.build.tags_opts())
            .artifact(
                ArtifactOpts::builder()
                    .registry_type(RegistryType::Ecr)
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
    use std::{fs, path::Path};

    use clap::Parser;
    use tempfile::TempDir;

    use super::{read_policy, EcrCommand};

    fn parse(args: &[&str]) -> EcrCommand {
        EcrCommand::try_parse_from(std::iter::once("kaniko-ecr").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn login_from_args() {
        let command = parse(&[
            "--registry=123456789012.dkr.ecr.eu-west-1.amazonaws.com",
            "--region=eu-west-1",
            "--access-key=AKIA",
            "--secret-key=secret",
            "--kaniko-version=1.7.0",
        ]);
        let login = command.login(None).unwrap();

        assert!(login
            .config
            .cred_helpers()
            .contains_key("123456789012.dkr.ecr.eu-west-1.amazonaws.com"));
        assert!(login.envs.iter().any(|(key, _)| key == "AWS_SECRET_ACCESS_KEY"));
    }

    #[test]
    fn no_push_without_keys_skips_registry() {
        let command = parse(&["--no-push"]);

        assert!(command.login(None).unwrap().envs.is_empty());
    }

    #[test]
    fn repository_settings() {
        let command = parse(&[
            "--registry=public.ecr.aws/abc123",
            "--repo=app",
            "--assume-role=arn:aws:iam::123456789012:role/push",
            "--external-id=ext",
            "--create-repository",
            "--lifecycle-policy=lifecycle.json",
        ]);

        assert_eq!(command.assume_role, "arn:aws:iam::123456789012:role/push");
        assert_eq!(command.external_id, "ext");
        assert!(command.create_repository);
        assert_eq!(command.lifecycle_policy.as_deref(), Some(Path::new("lifecycle.json")));
        assert!(command.repository_policy.is_none());
        assert_eq!(command.aws_session().region, "us-east-1");
    }

    #[test]
    fn no_push_skips_repository_creation() {
        let command = parse(&["--no-push", "--create-repository"]);

        // An empty registry would fail creation, so this only passes when skipped
        command.prepare_repository(&command.aws_session()).unwrap();
    }

    #[test]
    fn reads_policy_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("policy.json");
        fs::write(&path, r#"{"rules":[]}"#).unwrap();

        assert_eq!(read_policy(&path).unwrap(), r#"{"rules":[]}"#);
        assert!(read_policy(&temp_dir.path().join("missing.json"))
            .unwrap_err()
            .to_string()
            .contains("missing.json"));
    }
}
