use miette::Result;

use super::opts::{BuildOpts, GenerateTagsOpts, PushTarballOpts};

/// Runs an image build.
pub trait BuildDriver {
    /// Runs the build logic for the driver.
    ///
    /// # Errors
    /// Will error if the build fails.
    fn build(opts: &BuildOpts) -> Result<()>;
}

/// Pushes images that were built ahead of time.
pub trait PushDriver {
    /// Pushes the image in a tarball to every tag.
    ///
    /// # Errors
    /// Will error if the tarball can't be loaded or a push fails.
    fn push_tarball(opts: &PushTarballOpts) -> Result<()>;
}

/// Gives access to information about the CI
/// system the plugin is running in.
pub trait CiDriver {
    /// Generates the tags for an image build.
    ///
    /// # Errors
    /// Will error if the tags can't be derived from the
    /// CI environment or the options conflict.
    fn generate_tags(opts: &GenerateTagsOpts) -> Result<Vec<String>>;
}
