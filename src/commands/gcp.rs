use clap::Parser;
use kaniko_plugin_process::{
    auth::{
        gcp::{GcpAuth, WorkloadIdentity},
        RegistryLogin,
    },
    drivers::{opts::BuildOpts, KanikoDriver},
};
use kaniko_plugin_utils::{
    artifact::RegistryType,
    constants::{
        DOCKER_CONFIG_DIR, DRONE_WORKSPACE, PLUGIN_JSON_KEY, PLUGIN_OIDC_TOKEN_ID,
        PLUGIN_POOL_ID, PLUGIN_PROJECT_NUMBER, PLUGIN_PROVIDER_ID, PLUGIN_REGISTRY,
        PLUGIN_SERVICE_ACCOUNT_EMAIL, REGISTRY_GCR,
    },
    secret::SecretValue,
};
use log::{debug, trace};
use miette::{bail, Result};

use crate::plugin::{ArtifactOpts, Plugin};

use super::{with_registry, BaseImageArgs, BuildArgs, LogArgs, PluginCommand};

/// Build an image with kaniko and push it to Google
/// Container Registry or Artifact Registry.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct GcpCommand {
    #[arg(skip = RegistryType::Gcr)]
    registry_type: RegistryType,

    /// The registry host, like `gcr.io` or `us-docker.pkg.dev`.
    #[arg(long, env = PLUGIN_REGISTRY, default_value = REGISTRY_GCR)]
    registry: String,

    /// A service account JSON key.
    #[arg(long, env = PLUGIN_JSON_KEY, hide_env_values = true)]
    json_key: Option<SecretValue>,

    /// An OIDC id token for workload identity federation.
    #[arg(long, env = PLUGIN_OIDC_TOKEN_ID, hide_env_values = true)]
    oidc_token: Option<SecretValue>,

    #[arg(long, env = PLUGIN_PROJECT_NUMBER, default_value = "")]
    project_number: String,

    #[arg(long, env = PLUGIN_POOL_ID, default_value = "")]
    pool_id: String,

    #[arg(long, env = PLUGIN_PROVIDER_ID, default_value = "")]
    provider_id: String,

    /// A service account to impersonate with the federated token.
    #[arg(long, env = PLUGIN_SERVICE_ACCOUNT_EMAIL, default_value = "")]
    service_account_email: String,

    #[arg(long, env = DRONE_WORKSPACE, default_value = "")]
    workspace: String,

    #[clap(flatten)]
    base_image: BaseImageArgs,

    #[clap(flatten)]
    pub build: BuildArgs,

    #[clap(flatten)]
    pub log: LogArgs,
}

impl GcpCommand {
    /// Reports pushed images as this registry type.
    #[must_use]
    pub const fn with_registry_type(mut self, registry_type: RegistryType) -> Self {
        self.registry_type = registry_type;
        self
    }

    /// The workload identity settings when an OIDC token is given.
    ///
    /// # Errors
    /// Will error if the token is given without the pool settings.
    pub fn workload_identity(&self) -> Result<Option<WorkloadIdentity<'_>>> {
        let Some(oidc_token) = self.oidc_token.as_ref().filter(|token| !token.is_empty()) else {
            return Ok(None);
        };

        if self.project_number.is_empty() || self.pool_id.is_empty() || self.provider_id.is_empty()
        {
            bail!(
                help = "Set the project number, pool id, and provider id",
                "Workload identity federation needs the pool settings"
            );
        }

        Ok(Some(
            WorkloadIdentity::builder()
                .oidc_token(oidc_token)
                .project_number(&self.project_number)
                .pool_id(&self.pool_id)
                .provider_id(&self.provider_id)
                .service_account_email(&self.service_account_email)
                .build(),
        ))
    }

    fn login(&self) -> Result<RegistryLogin> {
        let base_image = self.base_image.credentials();

        GcpAuth::builder()
            .maybe_json_key(self.json_key.as_ref())
            .maybe_workload_identity(self.workload_identity()?)
            .maybe_base_image(base_image.as_ref())
            .workspace(&self.workspace)
            .no_push(self.build.no_push)
            .build()
            .login()
    }
}

impl PluginCommand for GcpCommand {
    fn try_run(&mut self) -> Result<()> {
        trace!("GcpCommand::try_run()");

        let login = self.login()?;
        let path = login.config.write_to(DOCKER_CONFIG_DIR)?;
        debug!("Wrote docker config to {}", path.display());

        let build_args = self.build.build_args()?;
        let digest_file = self.build.digest_file()?;
        let repo = with_registry(&self.registry, &self.build.repo);

        Plugin::builder()
            .build_opts(BuildOpts {
                repo: repo.into(),
                envs: &login.envs,
                ..self.build.build_opts(&build_args, digest_file.as_deref())
            })
            .tag_opts(self.build.tags_opts())
            .artifact(
                ArtifactOpts::builder()
                    .registry_type(self.registry_type)
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
    use kaniko_plugin_utils::artifact::RegistryType;

    use super::GcpCommand;

    fn parse(args: &[&str]) -> GcpCommand {
        GcpCommand::try_parse_from(std::iter::once("kaniko-gcr").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults_to_gcr() {
        let command = parse(&[]);

        assert_eq!(command.registry, "gcr.io");
        assert_eq!(command.registry_type, RegistryType::Gcr);
        assert_eq!(
            command.with_registry_type(RegistryType::Gar).registry_type,
            RegistryType::Gar
        );
    }

    #[test]
    fn workload_identity_settings() {
        let command = parse(&[
            "--oidc-token=token",
            "--project-number=1234",
            "--pool-id=pool",
            "--provider-id=provider",
        ]);
        let identity = command.workload_identity().unwrap().unwrap();

        assert_eq!(identity.project_number, "1234");
        assert_eq!(identity.oidc_token.value(), "token");
    }

    #[test]
    fn workload_identity_needs_pool() {
        let command = parse(&["--oidc-token=token", "--project-number=1234"]);

        assert!(command.workload_identity().is_err());
    }

    #[test]
    fn no_token_no_workload_identity() {
        let command = parse(&["--project-number=1234"]);

        assert!(command.workload_identity().unwrap().is_none());
    }
}
