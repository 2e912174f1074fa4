use std::process::Command;

use comlexr::cmd;
use kaniko_plugin_utils::{
    constants::{KANIKO_EXECUTOR, KANIKO_EXECUTOR_PATH},
    string,
};
use log::{info, trace};
use miette::{bail, IntoDiagnostic, Result};

#[cfg(not(test))]
use kaniko_plugin_utils::get_env_var;

#[cfg(test)]
use kaniko_plugin_utils::test_utils::get_env_var;

use crate::logging::CommandLogging;

use super::{opts::BuildOpts, BuildDriver};

#[derive(Debug)]
pub struct KanikoDriver;

impl KanikoDriver {
    /// Composes the executor command for a build.
    ///
    /// The executor location can be overridden with `KANIKO_EXECUTOR`.
    #[must_use]
    pub fn command(opts: &BuildOpts) -> Command {
        trace!("KanikoDriver::command({opts:#?})");

        let executor = get_env_var(KANIKO_EXECUTOR)
            .ok()
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| string!(KANIKO_EXECUTOR_PATH));

        let mut command = cmd!(
            executor,
            format!("--dockerfile={}", opts.dockerfile.display()),
            format!("--context=dir://{}", opts.context.display()),
            if let Some(sub_path) = opts.context_sub_path.as_ref() => format!("--context-sub-path={sub_path}"),
            for tag in opts.tags => format!("--destination={}:{tag}", opts.repo),
            if opts.no_push => "--no-push",
            if let Some(tar_path) = opts.tar_path.as_ref() => format!("--tar-path={}", tar_path.display()),
            for arg in opts.build_args => format!("--build-arg={arg}"),
            for label in opts.labels => format!("--label={label}"),
            if let Some(target) = opts.target.as_ref() => format!("--target={target}"),
            if opts.skip_tls_verify => "--skip-tls-verify=true",
            if let Some(mode) = opts.snapshot_mode.as_ref() => format!("--snapshot-mode={mode}"),
            if opts.enable_cache => "--cache=true",
            if let Some(cache_repo) = opts.cache_repo.as_ref() => format!("--cache-repo={cache_repo}"),
            if let Some(ttl) = opts.cache_ttl => format!("--cache-ttl={ttl}h"),
            if let Some(digest_file) = opts.digest_file.as_ref() => format!("--digest-file={}", digest_file.display()),
            for mirror in opts.registry_mirrors => format!("--registry-mirror={mirror}"),
            if let Some(verbosity) = opts.verbosity.as_ref() => format!("--verbosity={verbosity}"),
            if let Some(platform) = opts.platform.as_ref() => format!("--custom-platform={platform}"),
            if opts.skip_unused_stages => "--skip-unused-stages=true",
            if let Some(retry) = opts.push_retry => format!("--push-retry={retry}"),
            if opts.reproducible => "--reproducible",
            if opts.single_snapshot => "--single-snapshot",
            if opts.insecure => "--insecure",
            if opts.insecure_pull => "--insecure-pull",
            if opts.cleanup => "--cleanup",
            if let Some(path) = opts.image_name_with_digest_file.as_ref() => format!("--image-name-with-digest-file={}", path.display()),
            if let Some(path) = opts.oci_layout_path.as_ref() => format!("--oci-layout-path={}", path.display()),
        );

        for (key, value) in opts.envs {
            command.env(key, value.value());
        }

        command
    }
}

impl BuildDriver for KanikoDriver {
    fn build(opts: &BuildOpts) -> Result<()> {
        trace!("KanikoDriver::build({opts:#?})");

        let command = Self::command(opts);
        info!("+ {}", display_command(&command));

        let status = command
            .build_status(&*opts.repo, "Building Image")
            .into_diagnostic()?;

        if status.success() {
            info!("Successfully built {}", opts.repo);
        } else {
            bail!("Failed to build {}", opts.repo);
        }
        Ok(())
    }
}

/// Joins the program and its arguments the way they'd be typed.
/// The environment isn't shown as it can hold credentials.
fn display_command(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
