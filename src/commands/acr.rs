use std::path::PathBuf;

use clap::Parser;
use kaniko_plugin_process::{
    auth::azure::{AcrAuth, AcrLogin},
    drivers::{opts::BuildOpts, KanikoDriver, OciPushDriver},
};
use kaniko_plugin_utils::{
    artifact::RegistryType,
    constants::{
        AZURE_DEFAULT_AUTHORITY_HOST, DOCKER_CONFIG_DIR, PLUGIN_AZURE_AUTHORITY_HOST,
        PLUGIN_CLIENT_ID, PLUGIN_CLIENT_SECRET, PLUGIN_OIDC_TOKEN_ID, PLUGIN_PUSH_ONLY,
        PLUGIN_REGISTRY, PLUGIN_SOURCE_TAR_PATH, PLUGIN_SUBSCRIPTION_ID, PLUGIN_TENANT_ID,
    },
    secret::SecretValue,
};
use log::{debug, info, trace};
use miette::{bail, Result};

use crate::plugin::{ArtifactOpts, Plugin};

use super::{with_registry, BaseImageArgs, BuildArgs, LogArgs, PluginCommand};

/// Build an image with kaniko and push it to Azure Container Registry.
#[derive(Debug, Parser)]
#[command(name = "kaniko-acr", version, about, long_about = None)]
pub struct AcrCommand {
    /// The registry host, like `myregistry.azurecr.io`.
    #[arg(long, env = PLUGIN_REGISTRY, default_value = "")]
    registry: String,

    #[arg(long, env = PLUGIN_TENANT_ID, default_value = "")]
    tenant_id: String,

    #[arg(long, env = PLUGIN_CLIENT_ID, default_value = "")]
    client_id: String,

    #[arg(long, env = PLUGIN_CLIENT_SECRET, hide_env_values = true)]
    client_secret: Option<SecretValue>,

    /// An OIDC id token used as a client assertion.
    #[arg(long, env = PLUGIN_OIDC_TOKEN_ID, hide_env_values = true)]
    oidc_token: Option<SecretValue>,

    /// Used to link the artifact to the registry in the Azure portal.
    #[arg(long, env = PLUGIN_SUBSCRIPTION_ID, default_value = "")]
    subscription_id: String,

    #[arg(long, env = PLUGIN_AZURE_AUTHORITY_HOST, default_value = AZURE_DEFAULT_AUTHORITY_HOST)]
    authority_host: String,

    /// Push the image tarball at `source-tar-path` instead of building.
    #[arg(long, env = PLUGIN_PUSH_ONLY)]
    push_only: bool,

    #[arg(long, env = PLUGIN_SOURCE_TAR_PATH)]
    source_tar_path: Option<PathBuf>,

    #[clap(flatten)]
    base_image: BaseImageArgs,

    #[clap(flatten)]
    pub build: BuildArgs,

    #[clap(flatten)]
    pub log: LogArgs,
}

impl PluginCommand for AcrCommand {
    fn try_run(&mut self) -> Result<()> {
        trace!("AcrCommand::try_run()");

        if self.push_only {
            return self.push_tarball();
        }

        let AcrLogin { login, public_url } = self.login(self.build.no_push)?;

        let path = login.config.write_to(DOCKER_CONFIG_DIR)?;
        debug!("Wrote docker config to {}", path.display());

        if let Some(public_url) = public_url.as_deref() {
            info!("Registry portal: {public_url}");
        }

        let build_args = self.build.build_args()?;
        let digest_file = self.build.digest_file()?;
        let cache_repo = self
            .build
            .cache_repo
            .as_deref()
            .map(|cache_repo| with_registry(&self.registry, cache_repo));

        Plugin::builder()
            .build_opts(BuildOpts {
                cache_repo: cache_repo.map(Into::into),
                envs: &login.envs,
                ..self.build.build_opts(&build_args, digest_file.as_deref())
            })
            .tag_opts(self.build.tags_opts())
            .artifact(
                ArtifactOpts::builder()
                    .registry_type(RegistryType::Acr)
                    .registry_url(public_url.as_deref().unwrap_or(self.registry.as_str()))
                    .image_name(&self.build.repo)
                    .maybe_artifact_file(self.build.artifact_file.as_deref())
                    .maybe_output_file(self.build.output_file.as_deref())
                    .build(),
            )
            .build()
            .exec::<KanikoDriver>()
    }
}

impl AcrCommand {
    fn login(&self, no_push: bool) -> Result<AcrLogin> {
        let base_image = self.base_image.credentials();
        AcrAuth::builder()
            .registry(&self.registry)
            .tenant_id(&self.tenant_id)
            .client_id(&self.client_id)
            .maybe_client_secret(self.client_secret.as_ref())
            .maybe_oidc_token(self.oidc_token.as_ref())
            .subscription_id(&self.subscription_id)
            .authority_host(&self.authority_host)
            .maybe_base_image(base_image.as_ref())
            .no_push(no_push)
            .build()
            .login()
    }

    /// Pushes a tarball built by an earlier step to `registry/repo`.
    fn push_tarball(&self) -> Result<()> {
        trace!("AcrCommand::push_tarball()");

        let Some(source_tar_path) = self
            .source_tar_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
        else {
            bail!(
                help = "Set source_tar_path to the image tarball to push",
                "A source tar path is required when push only is set"
            );
        };

        if self.registry.is_empty() || self.build.repo.is_empty() {
            bail!("Repository and registry must be specified for push only");
        }

        let AcrLogin { login, .. } = self.login(false)?;
        let path = login.config.write_to(DOCKER_CONFIG_DIR)?;
        debug!("Wrote docker config to {}", path.display());

        let credentials = login.config.credentials(&self.registry);
        let repo = with_registry(&self.registry, &self.build.repo);

        Plugin::builder()
            .build_opts(BuildOpts {
                repo: repo.into(),
                ..self.build.build_opts(&[], None)
            })
            .tag_opts(self.build.tags_opts())
            .artifact(ArtifactOpts::builder().registry_type(RegistryType::Acr).build())
            .build()
            .push_tarball::<OciPushDriver>(source_tar_path, credentials.as_ref())
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use clap::Parser;

    use crate::commands::PluginCommand;

    use super::AcrCommand;

    #[test]
    fn parses_azure_settings() {
        let command = AcrCommand::try_parse_from([
            "kaniko-acr",
            "--registry=myregistry.azurecr.io",
            "--tenant-id=tenant",
            "--client-id=client",
            "--client-secret=secret",
            "--repo=app",
        ])
        .unwrap();

        assert_eq!(command.registry, "myregistry.azurecr.io");
        assert_eq!(command.authority_host, "https://login.microsoftonline.com");
        assert_eq!(command.build.repo, "app");
        assert_eq!(command.client_secret.unwrap().value(), "secret");
    }

    #[test]
    fn push_only_requires_source_tar_path() {
        let mut command = AcrCommand::try_parse_from([
            "kaniko-acr",
            "--registry=myregistry.azurecr.io",
            "--repo=app",
            "--push-only",
        ])
        .unwrap();

        let err = command.try_run().unwrap_err();
        assert!(err.to_string().contains("source tar path is required"));
    }

    #[test]
    fn push_only_requires_registry() {
        let mut command = AcrCommand::try_parse_from([
            "kaniko-acr",
            "--repo=app",
            "--push-only",
            "--source-tar-path=/tmp/image.tar",
        ])
        .unwrap();

        assert!(command.push_only);
        assert_eq!(command.source_tar_path, Some(PathBuf::from("/tmp/image.tar")));
        let err = command.try_run().unwrap_err();
        assert!(err.to_string().contains("Repository and registry"));
    }
}
