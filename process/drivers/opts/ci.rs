use bon::Builder;

#[allow(clippy::struct_field_names)]
#[derive(Debug, Clone, Copy, Builder)]
pub struct GenerateTagsOpts<'scope> {
    /// The tags given by the user.
    #[builder(default)]
    pub tags: &'scope [String],

    /// Derive the tags from the commit ref instead.
    #[builder(default)]
    pub auto_tag: bool,

    #[builder(default)]
    pub auto_tag_suffix: &'scope str,

    /// Expand semver tags into their major and minor tags.
    #[builder(default)]
    pub expand_tag: bool,

    #[builder(default)]
    pub commit_ref: &'scope str,

    #[builder(default)]
    pub default_branch: &'scope str,
}
