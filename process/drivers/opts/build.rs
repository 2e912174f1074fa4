use std::{borrow::Cow, path::Path};

use bon::Builder;
use kaniko_plugin_utils::secret::SecretValue;

/// Options for building an image with the executor.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Builder)]
pub struct BuildOpts<'scope> {
    #[builder(into)]
    pub dockerfile: Cow<'scope, Path>,

    #[builder(into)]
    pub context: Cow<'scope, Path>,

    /// A sub directory of the context to build from.
    #[builder(into)]
    pub context_sub_path: Option<Cow<'scope, str>>,

    /// The image repository without a tag.
    #[builder(into)]
    pub repo: Cow<'scope, str>,

    /// Every tag is pushed as `repo:tag`.
    #[builder(default)]
    pub tags: &'scope [String],

    #[builder(default)]
    pub build_args: &'scope [String],

    #[builder(default)]
    pub labels: &'scope [String],

    #[builder(into)]
    pub target: Option<Cow<'scope, str>>,

    #[builder(default)]
    pub skip_tls_verify: bool,

    #[builder(into)]
    pub snapshot_mode: Option<Cow<'scope, str>>,

    #[builder(default)]
    pub enable_cache: bool,

    #[builder(into)]
    pub cache_repo: Option<Cow<'scope, str>>,

    /// Cache timeout in hours.
    pub cache_ttl: Option<u32>,

    /// Where the executor writes the pushed image digest.
    #[builder(into)]
    pub digest_file: Option<Cow<'scope, Path>>,

    #[builder(default)]
    pub registry_mirrors: &'scope [String],

    /// The executor's own log level.
    #[builder(into)]
    pub verbosity: Option<Cow<'scope, str>>,

    #[builder(into)]
    pub platform: Option<Cow<'scope, str>>,

    #[builder(default)]
    pub skip_unused_stages: bool,

    pub push_retry: Option<u32>,

    #[builder(default)]
    pub reproducible: bool,

    #[builder(default)]
    pub single_snapshot: bool,

    #[builder(default)]
    pub insecure: bool,

    #[builder(default)]
    pub insecure_pull: bool,

    #[builder(default)]
    pub cleanup: bool,

    /// Build the image without pushing it.
    #[builder(default)]
    pub no_push: bool,

    /// Save the image as a tarball at this path.
    #[builder(into)]
    pub tar_path: Option<Cow<'scope, Path>>,

    #[builder(into)]
    pub image_name_with_digest_file: Option<Cow<'scope, Path>>,

    #[builder(into)]
    pub oci_layout_path: Option<Cow<'scope, Path>>,

    /// Environment variables only the executor process receives.
    #[builder(default)]
    pub envs: &'scope [(String, SecretValue)],
}
