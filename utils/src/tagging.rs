//! Image tag derivation.
//!
//! Tags that look like semantic versions can be expanded into the floating
//! `major` and `major.minor` tags alongside the full version, and tags can be
//! derived automatically from the commit ref that triggered the pipeline.

use log::trace;
use miette::Diagnostic;
use semver::Version;
use thiserror::Error;

use crate::{
    constants::{HEAD_REF_PREFIX, LATEST_TAG, TAG_REF_PREFIX},
    string, string_vec,
};

#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum TagError {
    #[error("Could not auto detect the tag. Skipping automated docker build for commit {commit_ref}")]
    #[diagnostic(help("Auto tagging only applies to tag refs and pushes to the default branch"))]
    CannotAutoDetect { commit_ref: String },

    #[error(
        "Invalid semantic version when auto detecting the tag. Skipping automated docker build for {commit_ref}"
    )]
    InvalidSemver { commit_ref: String },
}

/// Expands a single tag into the labels it should be pushed as.
///
/// When `expand` is enabled and the tag is a semantic version (with or
/// without a leading `v`) a release produces `major`, `major.minor` and
/// `major.minor.patch`, each carrying the build metadata of the tag.
/// A pre-release only produces its full version so floating tags never
/// move to an unstable release. Anything else is returned untouched.
///
/// # Examples
/// ```
/// use kaniko_plugin_utils::tagging::expand_tag;
///
/// assert_eq!(expand_tag("v1.2.3", true), vec!["1", "1.2", "1.2.3"]);
/// assert_eq!(expand_tag("v1.2.3-rc1", true), vec!["1.2.3-rc1"]);
/// assert_eq!(expand_tag("latest", true), vec!["latest"]);
/// assert_eq!(expand_tag("v1.2.3", false), vec!["v1.2.3"]);
/// ```
#[must_use]
pub fn expand_tag(tag: &str, expand: bool) -> Vec<String> {
    if !expand {
        return string_vec![tag];
    }

    parse_semver_tag(tag).map_or_else(|| string_vec![tag], |version| labels_for_version(&version))
}

/// Whether the commit ref is eligible for automatic tagging.
///
/// Tag refs are always eligible, branch refs only when they
/// point at the repository's default branch.
#[must_use]
pub fn use_auto_tag(commit_ref: &str, default_branch: &str) -> bool {
    commit_ref.starts_with(TAG_REF_PREFIX)
        || commit_ref
            .strip_prefix(HEAD_REF_PREFIX)
            .unwrap_or(commit_ref)
            == default_branch
}

/// Derives the tags for a commit ref.
///
/// A push to the default branch is tagged `latest`, a version tag ref is
/// expanded like [`expand_tag`]. A non-empty `suffix` is appended to every
/// derived tag as `<tag>-<suffix>`.
///
/// # Errors
/// Errors when the ref isn't eligible for auto tagging or when a
/// tag ref doesn't hold a semantic version.
pub fn auto_tags(
    commit_ref: &str,
    default_branch: &str,
    suffix: &str,
) -> Result<Vec<String>, TagError> {
    trace!("auto_tags({commit_ref}, {default_branch}, {suffix})");

    if !use_auto_tag(commit_ref, default_branch) {
        return Err(TagError::CannotAutoDetect {
            commit_ref: string!(commit_ref),
        });
    }

    let tags = match commit_ref.strip_prefix(TAG_REF_PREFIX) {
        Some(raw_tag) => {
            let version = parse_semver_tag(raw_tag).ok_or_else(|| TagError::InvalidSemver {
                commit_ref: string!(commit_ref),
            })?;
            labels_for_version(&version)
        }
        None => string_vec![LATEST_TAG],
    };

    Ok(if suffix.is_empty() {
        tags
    } else {
        tags.into_iter()
            .map(|tag| format!("{tag}-{suffix}"))
            .collect()
    })
}

fn labels_for_version(version: &Version) -> Vec<String> {
    if !version.pre.is_empty() {
        return vec![version.to_string()];
    }

    let build = if version.build.is_empty() {
        String::new()
    } else {
        format!("+{}", version.build)
    };

    vec![
        format!("{}{build}", version.major),
        format!("{}.{}{build}", version.major, version.minor),
        format!("{}.{}.{}{build}", version.major, version.minor, version.patch),
    ]
}

/// Parses a tag as a `v` prefixed semantic version, retrying with
/// the prefix added. Underscores aren't valid in semver so they are
/// swapped for dashes first.
fn parse_semver_tag(tag: &str) -> Option<Version> {
    let normalized = tag.replace('_', "-");
    parse_prefixed(&normalized).or_else(|| parse_prefixed(&format!("v{normalized}")))
}

/// `v1` and `v1.2` are accepted as shorthand for `v1.0.0` and `v1.2.0`,
/// but only without pre-release or build metadata.
fn parse_prefixed(tag: &str) -> Option<Version> {
    let version = tag.strip_prefix('v')?;
    let core_end = version.find(['-', '+']).unwrap_or(version.len());
    let (core, rest) = version.split_at(core_end);

    let full = match core.split('.').count() {
        3 => string!(version),
        1 if rest.is_empty() => format!("{core}.0.0"),
        2 if rest.is_empty() => format!("{core}.0"),
        _ => return None,
    };

    Version::parse(&full).ok()
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::string_vec;

    use super::{auto_tags, expand_tag, use_auto_tag, TagError};

    #[rstest]
    #[case::semver("v1.2.3", string_vec!["1", "1.2", "1.2.3"])]
    #[case::no_patch("v1.2", string_vec!["1", "1.2", "1.2.0"])]
    #[case::only_major("v1", string_vec!["1", "1.0", "1.0.0"])]
    #[case::full_with_build(
        "v1.2.3+build-info",
        string_vec!["1+build-info", "1.2+build-info", "1.2.3+build-info"],
    )]
    #[case::build_with_underscores(
        "v1.2.3+linux_amd64",
        string_vec!["1+linux-amd64", "1.2+linux-amd64", "1.2.3+linux-amd64"],
    )]
    #[case::prerelease("v1.2.3-rc1", string_vec!["1.2.3-rc1"])]
    #[case::prerelease_with_build("v1.2.3-rc1+bld", string_vec!["1.2.3-rc1+bld"])]
    #[case::shorthand_with_build("v1+bld", string_vec!["v1+bld"])]
    #[case::without_prefix("1.2.3", string_vec!["1", "1.2", "1.2.3"])]
    #[case::leading_zero("v01.2.3", string_vec!["v01.2.3"])]
    #[case::non_semver("latest", string_vec!["latest"])]
    #[case::non_semver_underscores("feature_x", string_vec!["feature_x"])]
    fn expand(#[case] tag: &str, #[case] expected: Vec<String>) {
        assert_eq!(expand_tag(tag, true), expected);
    }

    #[rstest]
    #[case("v1.2.3")]
    #[case("v1.2.3+linux_amd64")]
    #[case("latest")]
    fn expand_disabled(#[case] tag: &str) {
        assert_eq!(expand_tag(tag, false), vec![tag]);
    }

    #[rstest]
    #[case("refs/tags/v1.0.0", "master", true)]
    #[case("refs/tags/anything", "master", true)]
    #[case("refs/heads/master", "master", true)]
    #[case("refs/heads/feature/test", "master", false)]
    #[case("refs/pull/12/head", "master", false)]
    fn auto_tag_eligibility(
        #[case] commit_ref: &str,
        #[case] default_branch: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(use_auto_tag(commit_ref, default_branch), expected);
    }

    #[rstest]
    #[case::commit_push("refs/heads/master", "", string_vec!["latest"])]
    #[case::tag_push("refs/tags/v1.0.0", "", string_vec!["1", "1.0", "1.0.0"])]
    #[case::beta_tag_push("refs/tags/v1.0.0-beta.1", "", string_vec!["1.0.0-beta.1"])]
    #[case::tag_push_with_suffix(
        "refs/tags/v1.0.0",
        "linux-amd64",
        string_vec!["1-linux-amd64", "1.0-linux-amd64", "1.0.0-linux-amd64"],
    )]
    #[case::commit_push_with_suffix("refs/heads/master", "linux-amd64", string_vec!["latest-linux-amd64"])]
    #[case::tag_with_build_metadata(
        "refs/tags/v1.2.3+linux_amd64",
        "",
        string_vec!["1+linux-amd64", "1.2+linux-amd64", "1.2.3+linux-amd64"],
    )]
    fn auto_tag(#[case] commit_ref: &str, #[case] suffix: &str, #[case] expected: Vec<String>) {
        assert_eq!(auto_tags(commit_ref, "master", suffix).unwrap(), expected);
    }

    #[test]
    fn auto_tag_feature_branch() {
        assert_eq!(
            auto_tags("refs/heads/feature/test", "master", ""),
            Err(TagError::CannotAutoDetect {
                commit_ref: "refs/heads/feature/test".into()
            })
        );
    }

    #[test]
    fn auto_tag_invalid_version() {
        assert_eq!(
            auto_tags("refs/tags/release-candidate", "master", ""),
            Err(TagError::InvalidSemver {
                commit_ref: "refs/tags/release-candidate".into()
            })
        );
    }
}
