use std::{borrow::Cow, path::Path};

use bon::Builder;
use kaniko_plugin_utils::docker_config::RegistryCredentials;

/// Options for pushing an image that was saved as a tarball.
#[derive(Debug, Clone, Builder)]
pub struct PushTarballOpts<'scope> {
    /// A docker image tarball, like one written by `--tar-path`.
    #[builder(into)]
    pub tarball: Cow<'scope, Path>,

    /// The image repository including the registry host.
    #[builder(into)]
    pub repo: Cow<'scope, str>,

    /// Every tag is pushed as `repo:tag`.
    #[builder(default)]
    pub tags: &'scope [String],

    pub credentials: Option<&'scope RegistryCredentials>,
}
