use kaniko_plugin_utils::{
    constants::LATEST_TAG,
    tagging::{auto_tags, expand_tag},
};
use log::{debug, trace};
use miette::{bail, Result};

use super::{opts::GenerateTagsOpts, CiDriver};

pub struct DroneDriver;

impl CiDriver for DroneDriver {
    fn generate_tags(opts: &GenerateTagsOpts) -> Result<Vec<String>> {
        trace!("DroneDriver::generate_tags({opts:?})");

        if !opts.auto_tag {
            let tags = opts
                .tags
                .iter()
                .flat_map(|tag| expand_tag(tag, opts.expand_tag))
                .collect::<Vec<_>>();
            trace!("{tags:?}");
            return Ok(tags);
        }

        // The tags default to `latest` so that single tag can't
        // be told apart from one set by the user.
        let default_tags =
            matches!(opts.tags, [] | [_]) && opts.tags.iter().all(|tag| tag == LATEST_TAG);
        if !default_tags {
            bail!(
                help = "Remove the tags or disable auto tagging",
                "The auto tag flag does not work with user provided tags {:?}",
                opts.tags,
            );
        }

        if opts.expand_tag {
            bail!("The auto tag flag cannot be used with the expand tag flag");
        }

        debug!(
            "Deriving tags from {} on default branch {}",
            opts.commit_ref, opts.default_branch
        );
        let tags = auto_tags(opts.commit_ref, opts.default_branch, opts.auto_tag_suffix)?;
        trace!("{tags:?}");

        Ok(tags)
    }
}
