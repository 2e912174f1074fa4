use std::path::Path;

use bon::Builder;
use kaniko_plugin_process::drivers::{
    opts::{BuildOpts, GenerateTagsOpts, PushTarballOpts},
    BuildDriver, CiDriver, DroneDriver, PushDriver,
};
use kaniko_plugin_utils::{
    artifact::{write_artifact_file, RegistryType},
    digest::read_digest_file,
    docker_config::RegistryCredentials,
    output::write_output_file,
};
use log::{debug, info, trace, warn};
use miette::{bail, Result};

/// Where and how the build result is reported.
#[derive(Debug, Clone, Copy, Builder)]
pub struct ArtifactOpts<'scope> {
    pub registry_type: RegistryType,

    /// The registry shown in the artifact file.
    #[builder(default)]
    pub registry_url: &'scope str,

    /// The image name shown in the artifact file, without the registry.
    #[builder(default)]
    pub image_name: &'scope str,

    /// Write a JSON artifact describing the pushed images here.
    pub artifact_file: Option<&'scope Path>,

    /// Write a dotenv file with the digest and tarball path here.
    pub output_file: Option<&'scope Path>,
}

/// Runs a build from start to finish.
#[derive(Debug, Clone, Builder)]
pub struct Plugin<'scope> {
    /// The executor options. The tags are resolved from `tag_opts`.
    pub build_opts: BuildOpts<'scope>,
    pub tag_opts: GenerateTagsOpts<'scope>,
    pub artifact: ArtifactOpts<'scope>,
}

impl Plugin<'_> {
    /// Resolves the tags, builds the image, and reports the result.
    ///
    /// # Errors
    /// Will error if the repository is missing, the dockerfile doesn't
    /// exist, the tags can't be resolved, the build fails, or the
    /// output file can't be written.
    pub fn exec<D>(&self) -> Result<()>
    where
        D: BuildDriver,
    {
        trace!("Plugin::exec()");

        self.check_repo()?;

        if !self.build_opts.dockerfile.exists() {
            bail!(
                "Dockerfile does not exist at path: {}",
                self.build_opts.dockerfile.display()
            );
        }

        let tags = DroneDriver::generate_tags(&self.tag_opts)?;
        debug!("Building with tags {tags:?}");

        D::build(&BuildOpts {
            tags: &tags,
            ..self.build_opts.clone()
        })?;

        let Some(digest_file) = self.build_opts.digest_file.as_deref() else {
            return Ok(());
        };

        let digest = read_digest_file(digest_file).unwrap_or_else(|e| {
            warn!("{e:?}");
            String::new()
        });

        if let Some(artifact_file) = self.artifact.artifact_file {
            match write_artifact_file(
                artifact_file,
                self.artifact.registry_type,
                self.artifact.registry_url,
                self.artifact.image_name,
                &digest,
                &tags,
            ) {
                Ok(()) => info!("Wrote artifact file {}", artifact_file.display()),
                Err(e) => warn!("Failed to write artifact file: {e:?}"),
            }
        }

        if let Some(output_file) = self.artifact.output_file {
            let tar_path = self
                .build_opts
                .tar_path
                .as_deref()
                .map(|path| path.display().to_string())
                .unwrap_or_default();

            write_output_file(output_file, &digest, &tar_path)?;
        }

        Ok(())
    }

    /// Pushes an image tarball to every resolved tag without
    /// running a build.
    ///
    /// # Errors
    /// Will error if the repository is missing, the tarball doesn't
    /// exist, the tags can't be resolved, or the push fails.
    pub fn push_tarball<P>(
        &self,
        tarball: &Path,
        credentials: Option<&RegistryCredentials>,
    ) -> Result<()>
    where
        P: PushDriver,
    {
        trace!("Plugin::push_tarball({})", tarball.display());

        self.check_repo()?;

        if !tarball.exists() {
            bail!("Image tarball does not exist at path: {}", tarball.display());
        }

        let tags = DroneDriver::generate_tags(&self.tag_opts)?;
        debug!("Pushing with tags {tags:?}");

        P::push_tarball(
            &PushTarballOpts::builder()
                .tarball(tarball)
                .repo(self.build_opts.repo.as_ref())
                .tags(&tags)
                .maybe_credentials(credentials)
                .build(),
        )?;
        info!("Pushed {} to {}", tarball.display(), self.build_opts.repo);

        Ok(())
    }

    fn check_repo(&self) -> Result<()> {
        if self.build_opts.repo.is_empty() {
            bail!(
                help = "Set the repo to publish the image to",
                "Repository name to publish image must be specified"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{
        fs,
        path::Path,
        sync::{LazyLock, Mutex},
    };

    use kaniko_plugin_process::drivers::{
        opts::{BuildOpts, GenerateTagsOpts, PushTarballOpts},
        BuildDriver, PushDriver,
    };
    use kaniko_plugin_utils::{
        artifact::RegistryType, docker_config::RegistryCredentials, string_vec,
    };
    use miette::{bail, IntoDiagnostic, Result};
    use tempfile::TempDir;

    use super::{ArtifactOpts, Plugin};

    const DIGEST: &str = "sha256:c0ffee";

    static BUILT_TAGS: LazyLock<Mutex<Vec<Vec<String>>>> = LazyLock::new(|| Mutex::new(vec![]));
    static PUSHED_IMAGES: LazyLock<Mutex<Vec<String>>> = LazyLock::new(|| Mutex::new(vec![]));

    /// Records the tags and writes the digest like the executor would.
    struct MockDriver;

    impl BuildDriver for MockDriver {
        fn build(opts: &BuildOpts) -> Result<()> {
            BUILT_TAGS.lock().unwrap().push(opts.tags.to_vec());
            if let Some(digest_file) = opts.digest_file.as_deref() {
                fs::write(digest_file, DIGEST).into_diagnostic()?;
            }
            Ok(())
        }
    }

    struct FailingDriver;

    impl BuildDriver for FailingDriver {
        fn build(_: &BuildOpts) -> Result<()> {
            bail!("Build failed")
        }
    }

    /// Records every `repo:tag` with the pushing user.
    struct MockPushDriver;

    impl PushDriver for MockPushDriver {
        fn push_tarball(opts: &PushTarballOpts) -> Result<()> {
            let user = opts.credentials.map(|c| c.username.as_str()).unwrap_or_default();
            PUSHED_IMAGES
                .lock()
                .unwrap()
                .extend(opts.tags.iter().map(|tag| format!("{user}@{}:{tag}", opts.repo)));
            Ok(())
        }
    }

    struct FailingPushDriver;

    impl PushDriver for FailingPushDriver {
        fn push_tarball(_: &PushTarballOpts) -> Result<()> {
            bail!("Failed to push image")
        }
    }

    fn push_plugin<'a>(repo: &'a str, tags: &'a [String]) -> Plugin<'a> {
        Plugin::builder()
            .build_opts(
                BuildOpts::builder()
                    .dockerfile(Path::new("Dockerfile"))
                    .context(Path::new("."))
                    .repo(repo)
                    .build(),
            )
            .tag_opts(GenerateTagsOpts::builder().tags(tags).build())
            .artifact(ArtifactOpts::builder().registry_type(RegistryType::Acr).build())
            .build()
    }

    fn dockerfile(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("Dockerfile");
        fs::write(&path, "FROM scratch\n").unwrap();
        path
    }

    #[test]
    fn builds_and_reports() {
        let temp_dir = TempDir::new().unwrap();
        let dockerfile = dockerfile(&temp_dir);
        let digest_file = temp_dir.path().join("digest-file");
        let artifact_file = temp_dir.path().join("artifacts").join("artifact.json");
        let output_file = temp_dir.path().join("output.env");
        let tags = string_vec!["v1.2.3"];

        let plugin = Plugin::builder()
            .build_opts(
                BuildOpts::builder()
                    .dockerfile(dockerfile.as_path())
                    .context(temp_dir.path())
                    .repo("registry.example.com/unique-repo-builds")
                    .digest_file(digest_file.as_path())
                    .build(),
            )
            .tag_opts(GenerateTagsOpts::builder().tags(&tags).expand_tag(true).build())
            .artifact(
                ArtifactOpts::builder()
                    .registry_type(RegistryType::Docker)
                    .registry_url("registry.example.com")
                    .image_name("unique-repo-builds")
                    .artifact_file(artifact_file.as_path())
                    .output_file(output_file.as_path())
                    .build(),
            )
            .build();

        plugin.exec::<MockDriver>().unwrap();

        assert!(BUILT_TAGS
            .lock()
            .unwrap()
            .contains(&string_vec!["1", "1.2", "1.2.3"]));

        let artifact: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&artifact_file).unwrap()).unwrap();
        assert_eq!(artifact["data"]["images"][2]["image"], "unique-repo-builds:1.2.3");
        assert_eq!(artifact["data"]["images"][2]["digest"], DIGEST);

        assert_eq!(
            fs::read_to_string(&output_file).unwrap(),
            format!("digest=\"{DIGEST}\"\n")
        );
    }

    #[test]
    fn requires_repo() {
        let temp_dir = TempDir::new().unwrap();
        let dockerfile = dockerfile(&temp_dir);

        let plugin = Plugin::builder()
            .build_opts(
                BuildOpts::builder()
                    .dockerfile(dockerfile.as_path())
                    .context(temp_dir.path())
                    .repo("")
                    .build(),
            )
            .tag_opts(GenerateTagsOpts::builder().build())
            .artifact(ArtifactOpts::builder().registry_type(RegistryType::Docker).build())
            .build();

        let err = plugin.exec::<MockDriver>().unwrap_err();
        assert!(err.to_string().contains("Repository name"));
    }

    #[test]
    fn requires_dockerfile() {
        let plugin = Plugin::builder()
            .build_opts(
                BuildOpts::builder()
                    .dockerfile(Path::new("/does/not/exist/Dockerfile"))
                    .context(Path::new("."))
                    .repo("plugins/test")
                    .build(),
            )
            .tag_opts(GenerateTagsOpts::builder().build())
            .artifact(ArtifactOpts::builder().registry_type(RegistryType::Docker).build())
            .build();

        let err = plugin.exec::<MockDriver>().unwrap_err();
        assert!(err.to_string().contains("/does/not/exist/Dockerfile"));
    }

    #[test]
    fn build_failure_skips_reports() {
        let temp_dir = TempDir::new().unwrap();
        let dockerfile = dockerfile(&temp_dir);
        let artifact_file = temp_dir.path().join("artifact.json");
        let tags = string_vec!["latest"];

        let plugin = Plugin::builder()
            .build_opts(
                BuildOpts::builder()
                    .dockerfile(dockerfile.as_path())
                    .context(temp_dir.path())
                    .repo("plugins/test")
                    .digest_file(temp_dir.path().join("digest-file"))
                    .build(),
            )
            .tag_opts(GenerateTagsOpts::builder().tags(&tags).build())
            .artifact(
                ArtifactOpts::builder()
                    .registry_type(RegistryType::Docker)
                    .artifact_file(artifact_file.as_path())
                    .build(),
            )
            .build();

        assert!(plugin.exec::<FailingDriver>().is_err());
        assert!(!artifact_file.exists());
    }

    #[test]
    fn invalid_auto_tag_stops_build() {
        let temp_dir = TempDir::new().unwrap();
        let dockerfile = dockerfile(&temp_dir);

        let plugin = Plugin::builder()
            .build_opts(
                BuildOpts::builder()
                    .dockerfile(dockerfile.as_path())
                    .context(temp_dir.path())
                    .repo("plugins/unique-repo-auto-tag")
                    .build(),
            )
            .tag_opts(
                GenerateTagsOpts::builder()
                    .auto_tag(true)
                    .commit_ref("refs/heads/feature")
                    .default_branch("main")
                    .build(),
            )
            .artifact(ArtifactOpts::builder().registry_type(RegistryType::Docker).build())
            .build();

        assert!(plugin.exec::<MockDriver>().is_err());
    }

    #[test]
    fn pushes_tarball_to_every_tag() {
        let temp_dir = TempDir::new().unwrap();
        let tarball = temp_dir.path().join("image.tar");
        fs::write(&tarball, "image").unwrap();
        let tags = string_vec!["latest", "v1"];
        let credentials = RegistryCredentials::builder()
            .registry("myregistry.azurecr.io")
            .username("pusher")
            .password("secret")
            .build();

        push_plugin("myregistry.azurecr.io/unique-repo-push", &tags)
            .push_tarball::<MockPushDriver>(&tarball, Some(&credentials))
            .unwrap();

        let pushed = PUSHED_IMAGES.lock().unwrap();
        assert!(pushed.contains(&"pusher@myregistry.azurecr.io/unique-repo-push:latest".into()));
        assert!(pushed.contains(&"pusher@myregistry.azurecr.io/unique-repo-push:v1".into()));
    }

    #[test]
    fn push_requires_repo() {
        let temp_dir = TempDir::new().unwrap();
        let tarball = temp_dir.path().join("image.tar");
        fs::write(&tarball, "image").unwrap();
        let tags = string_vec!["latest"];

        let err = push_plugin("", &tags)
            .push_tarball::<MockPushDriver>(&tarball, None)
            .unwrap_err();
        assert!(err.to_string().contains("Repository name"));
    }

    #[test]
    fn push_requires_tarball() {
        let tags = string_vec!["latest"];

        let err = push_plugin("myregistry.azurecr.io/app", &tags)
            .push_tarball::<MockPushDriver>(Path::new("/does/not/exist/image.tar"), None)
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Image tarball does not exist at path: /does/not/exist/image.tar"));
    }

    #[test]
    fn push_failure_is_returned() {
        let temp_dir = TempDir::new().unwrap();
        let tarball = temp_dir.path().join("image.tar");
        fs::write(&tarball, "image").unwrap();
        let tags = string_vec!["latest"];

        let err = push_plugin("myregistry.azurecr.io/app", &tags)
            .push_tarball::<FailingPushDriver>(&tarball, None)
            .unwrap_err();
        assert!(err.to_string().contains("Failed to push image"));
    }
}
