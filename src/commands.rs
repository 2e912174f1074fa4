use std::{
    convert::Infallible,
    path::{Path, PathBuf},
};

use clap::Args;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use kaniko_plugin_process::drivers::opts::{BuildOpts, GenerateTagsOpts};
use kaniko_plugin_utils::{
    constants::{
        DEFAULT_CONTEXT, DEFAULT_DIGEST_FILE, DEFAULT_DOCKERFILE, DRONE_COMMIT_REF, DRONE_OUTPUT,
        DRONE_REPO_BRANCH, LATEST_TAG, PLUGIN_ARTIFACT_FILE, PLUGIN_AUTO_TAG,
        PLUGIN_AUTO_TAG_SUFFIX, PLUGIN_BASE_IMAGE_PASSWORD, PLUGIN_BASE_IMAGE_REGISTRY,
        PLUGIN_BASE_IMAGE_USERNAME, PLUGIN_BUILD_ARGS, PLUGIN_BUILD_ARGS_FROM_ENV,
        PLUGIN_BUILD_ARGS_NEW, PLUGIN_CACHE_REPO, PLUGIN_CACHE_TTL, PLUGIN_CLEANUP, PLUGIN_CONTEXT,
        PLUGIN_CONTEXT_SUB_PATH, PLUGIN_CUSTOM_LABELS, PLUGIN_DOCKERFILE, PLUGIN_ENABLE_CACHE,
        PLUGIN_ENV_FILE, PLUGIN_EXPAND_TAG, PLUGIN_IMAGE_NAME_WITH_DIGEST_FILE, PLUGIN_INSECURE,
        PLUGIN_INSECURE_PULL, PLUGIN_LOG_DIR, PLUGIN_MULTIPLE_BUILD_ARGS, PLUGIN_NO_PUSH,
        PLUGIN_OCI_LAYOUT_PATH, PLUGIN_PLATFORM, PLUGIN_PUSH_RETRY, PLUGIN_REGISTRY_MIRRORS,
        PLUGIN_REPO, PLUGIN_REPRODUCIBLE, PLUGIN_SINGLE_SNAPSHOT, PLUGIN_SKIP_TLS_VERIFY,
        PLUGIN_SKIP_UNUSED_STAGES, PLUGIN_SNAPSHOT_MODE, PLUGIN_TAGS, PLUGIN_TARGET,
        PLUGIN_TAR_PATH, PLUGIN_VERBOSITY,
    },
    digest::digest_file_name,
    docker_config::RegistryCredentials,
    secret::SecretValue,
};
use log::{debug, error, trace};
use miette::{bail, IntoDiagnostic, Result, WrapErr};

#[cfg(not(test))]
use kaniko_plugin_utils::get_env_var;

#[cfg(test)]
use kaniko_plugin_utils::test_utils::get_env_var;

pub mod acr;
pub mod docker;
pub mod ecr;
pub mod gcp;

pub trait PluginCommand {
    /// Runs the command and returns a result
    /// of the execution
    ///
    /// # Errors
    /// Can return a `miette` Error
    fn try_run(&mut self) -> Result<()>;

    /// Runs the command and exits if there is an error.
    fn run(&mut self) {
        if let Err(e) = self.try_run() {
            error!("Failed:\n{e:?}");
            std::process::exit(1);
        }
    }
}

/// Loads the file named by `PLUGIN_ENV_FILE` into the environment.
/// Variables that are already set keep their values.
///
/// # Errors
/// Will error if the file can't be read or parsed.
pub fn load_env_file() -> Result<()> {
    let Ok(env_file) = get_env_var(PLUGIN_ENV_FILE) else {
        return Ok(());
    };
    if env_file.is_empty() {
        return Ok(());
    }

    dotenvy::from_path(&env_file)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to load env file {env_file}"))?;
    debug!("Loaded env file {env_file}");

    Ok(())
}

/// Settings for the plugin's own logs.
#[derive(Debug, Clone, Args)]
pub struct LogArgs {
    #[clap(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    /// Also write logs and executor output to this directory.
    #[arg(long, env = PLUGIN_LOG_DIR)]
    pub log_dir: Option<PathBuf>,
}

/// Credentials for pulling base images from a registry
/// other than the one being pushed to.
#[derive(Debug, Default, Clone, Args)]
pub struct BaseImageArgs {
    #[arg(long, env = PLUGIN_BASE_IMAGE_REGISTRY, default_value = "")]
    pub base_image_registry: String,

    #[arg(long, env = PLUGIN_BASE_IMAGE_USERNAME, default_value = "")]
    pub base_image_username: String,

    #[arg(long, env = PLUGIN_BASE_IMAGE_PASSWORD, hide_env_values = true)]
    pub base_image_password: Option<SecretValue>,
}

impl BaseImageArgs {
    #[must_use]
    pub fn credentials(&self) -> Option<RegistryCredentials> {
        if self.base_image_registry.is_empty() {
            return None;
        }

        Some(
            RegistryCredentials::builder()
                .registry(&self.base_image_registry)
                .username(&self.base_image_username)
                .password(self.base_image_password.clone().unwrap_or_default())
                .build(),
        )
    }
}

/// Options shared by every registry's build.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
    /// The dockerfile to build.
    #[arg(long, env = PLUGIN_DOCKERFILE, default_value = DEFAULT_DOCKERFILE)]
    pub dockerfile: PathBuf,

    /// The build context.
    #[arg(long, env = PLUGIN_CONTEXT, default_value = DEFAULT_CONTEXT)]
    pub context: PathBuf,

    /// A sub directory of the context to build from.
    #[arg(long, env = PLUGIN_CONTEXT_SUB_PATH)]
    pub context_sub_path: Option<String>,

    /// The image repository to push to.
    #[arg(long, env = PLUGIN_REPO, default_value = "")]
    pub repo: String,

    /// The tags to push. Ignored when auto tagging.
    #[arg(long, env = PLUGIN_TAGS, value_delimiter = ',', default_value = LATEST_TAG)]
    pub tags: Vec<String>,

    /// Derive the tags from the commit ref.
    ///
    /// A semver tag ref is expanded into its major, minor,
    /// and patch tags. The default branch is tagged `latest`.
    #[arg(long, env = PLUGIN_AUTO_TAG)]
    pub auto_tag: bool,

    /// A suffix added to every auto tag.
    #[arg(long, env = PLUGIN_AUTO_TAG_SUFFIX, default_value = "")]
    pub auto_tag_suffix: String,

    /// Expand semver tags into their major and minor tags.
    #[arg(long, env = PLUGIN_EXPAND_TAG)]
    pub expand_tag: bool,

    #[arg(long, env = PLUGIN_BUILD_ARGS, value_delimiter = ',')]
    pub build_args: Vec<String>,

    /// Build args separated by `;` so values can hold commas.
    #[arg(long, env = PLUGIN_BUILD_ARGS_NEW, value_delimiter = ';', value_parser = trimmed)]
    pub build_args_new: Vec<String>,

    /// Use `build-args-new` in place of `build-args`.
    #[arg(long, env = PLUGIN_MULTIPLE_BUILD_ARGS)]
    pub multiple_build_args: bool,

    /// Build args whose values are read from the
    /// environment variable of the same name.
    #[arg(long, env = PLUGIN_BUILD_ARGS_FROM_ENV, value_delimiter = ',')]
    pub build_args_from_env: Vec<String>,

    /// The dockerfile stage to build.
    #[arg(long, env = PLUGIN_TARGET)]
    pub target: Option<String>,

    #[arg(long, env = PLUGIN_CUSTOM_LABELS, value_delimiter = ',')]
    pub custom_labels: Vec<String>,

    #[arg(long, env = PLUGIN_REGISTRY_MIRRORS, value_delimiter = ',')]
    pub registry_mirrors: Vec<String>,

    #[arg(long, env = PLUGIN_SKIP_TLS_VERIFY)]
    pub skip_tls_verify: bool,

    #[arg(long, env = PLUGIN_SNAPSHOT_MODE)]
    pub snapshot_mode: Option<String>,

    /// Cache layers in a registry repository.
    #[arg(long, env = PLUGIN_ENABLE_CACHE)]
    pub enable_cache: bool,

    #[arg(long, env = PLUGIN_CACHE_REPO)]
    pub cache_repo: Option<String>,

    /// Cache timeout in hours.
    #[arg(long, env = PLUGIN_CACHE_TTL)]
    pub cache_ttl: Option<u32>,

    /// Write a JSON artifact describing the pushed images.
    #[arg(long, env = PLUGIN_ARTIFACT_FILE)]
    pub artifact_file: Option<PathBuf>,

    /// Write the digest and tarball path to this dotenv file.
    #[arg(long, env = DRONE_OUTPUT)]
    pub output_file: Option<PathBuf>,

    /// Build the image without pushing it.
    #[arg(long, env = PLUGIN_NO_PUSH)]
    pub no_push: bool,

    /// Save the image as a tarball.
    #[arg(long, env = PLUGIN_TAR_PATH)]
    pub tar_path: Option<PathBuf>,

    /// The executor's log level.
    #[arg(long = "verbosity", env = PLUGIN_VERBOSITY)]
    pub executor_verbosity: Option<String>,

    /// Build for another platform, like `linux/arm64`.
    #[arg(long, env = PLUGIN_PLATFORM)]
    pub platform: Option<String>,

    #[arg(long, env = PLUGIN_SKIP_UNUSED_STAGES)]
    pub skip_unused_stages: bool,

    #[arg(long, env = PLUGIN_PUSH_RETRY)]
    pub push_retry: Option<u32>,

    /// Strip timestamps from the image.
    #[arg(long, env = PLUGIN_REPRODUCIBLE)]
    pub reproducible: bool,

    #[arg(long, env = PLUGIN_SINGLE_SNAPSHOT)]
    pub single_snapshot: bool,

    /// Push to a plain HTTP registry.
    #[arg(long, env = PLUGIN_INSECURE)]
    pub insecure: bool,

    /// Pull from a plain HTTP registry.
    #[arg(long, env = PLUGIN_INSECURE_PULL)]
    pub insecure_pull: bool,

    /// Clean the filesystem when the build finishes.
    #[arg(long, env = PLUGIN_CLEANUP)]
    pub cleanup: bool,

    #[arg(long, env = PLUGIN_IMAGE_NAME_WITH_DIGEST_FILE)]
    pub image_name_with_digest_file: Option<PathBuf>,

    #[arg(long, env = PLUGIN_OCI_LAYOUT_PATH)]
    pub oci_layout_path: Option<PathBuf>,

    #[arg(long, env = DRONE_COMMIT_REF, default_value = "")]
    pub drone_commit_ref: String,

    #[arg(long, env = DRONE_REPO_BRANCH, default_value = "")]
    pub drone_repo_branch: String,
}

impl BuildArgs {
    /// The build args, including those read from the environment.
    ///
    /// # Errors
    /// Will error if a build arg from the environment isn't set.
    pub fn build_args(&self) -> Result<Vec<String>> {
        let build_args = if self.multiple_build_args {
            &self.build_args_new
        } else {
            &self.build_args
        };
        let mut build_args = build_args
            .iter()
            .filter(|arg| !arg.is_empty())
            .cloned()
            .collect::<Vec<_>>();

        for name in self.build_args_from_env.iter().filter(|name| !name.is_empty()) {
            let Ok(value) = get_env_var(name) else {
                bail!("Build arg {name} is not set in the environment");
            };
            build_args.push(format!("{name}={value}"));
        }

        Ok(build_args)
    }

    /// Where the executor should write the image digest, if anything
    /// reports it.
    ///
    /// # Errors
    /// Will error if the digest file's directory can't be created.
    pub fn digest_file(&self) -> Result<Option<PathBuf>> {
        digest_file_name(
            self.artifact_file.as_ref().map(|_| Path::new(DEFAULT_DIGEST_FILE)),
            self.output_file.as_deref(),
        )
    }

    #[must_use]
    pub fn tags_opts(&self) -> GenerateTagsOpts<'_> {
        GenerateTagsOpts::builder()
            .tags(&self.tags)
            .auto_tag(self.auto_tag)
            .auto_tag_suffix(&self.auto_tag_suffix)
            .expand_tag(self.expand_tag)
            .commit_ref(&self.drone_commit_ref)
            .default_branch(&self.drone_repo_branch)
            .build()
    }

    /// The executor options for these args. The repo is used as given.
    #[must_use]
    pub fn build_opts<'scope>(
        &'scope self,
        build_args: &'scope [String],
        digest_file: Option<&'scope Path>,
    ) -> BuildOpts<'scope> {
        trace!("BuildArgs::build_opts()");

        BuildOpts::builder()
            .dockerfile(self.dockerfile.as_path())
            .context(self.context.as_path())
            .maybe_context_sub_path(self.context_sub_path.as_deref())
            .repo(self.repo.as_str())
            .build_args(build_args)
            .labels(&self.custom_labels)
            .maybe_target(self.target.as_deref())
            .skip_tls_verify(self.skip_tls_verify)
            .maybe_snapshot_mode(self.snapshot_mode.as_deref())
            .enable_cache(self.enable_cache)
            .maybe_cache_repo(self.cache_repo.as_deref())
            .maybe_cache_ttl(self.cache_ttl)
            .maybe_digest_file(digest_file)
            .registry_mirrors(&self.registry_mirrors)
            .maybe_verbosity(self.executor_verbosity.as_deref())
            .maybe_platform(self.platform.as_deref())
            .skip_unused_stages(self.skip_unused_stages)
            .maybe_push_retry(self.push_retry)
            .reproducible(self.reproducible)
            .single_snapshot(self.single_snapshot)
            .insecure(self.insecure)
            .insecure_pull(self.insecure_pull)
            .cleanup(self.cleanup)
            .no_push(self.no_push)
            .maybe_tar_path(self.tar_path.as_deref())
            .maybe_image_name_with_digest_file(self.image_name_with_digest_file.as_deref())
            .maybe_oci_layout_path(self.oci_layout_path.as_deref())
            .build()
    }
}

#[allow(clippy::unnecessary_wraps)]
fn trimmed(value: &str) -> Result<String, Infallible> {
    Ok(value.trim().to_string())
}

/// Prefixes a repository with its registry host.
/// An empty name stays empty so missing settings are still caught.
#[must_use]
pub fn with_registry(registry: &str, name: &str) -> String {
    if registry.is_empty() || name.is_empty() {
        name.to_string()
    } else {
        format!("{}/{name}", registry.trim_end_matches('/'))
    }
}
