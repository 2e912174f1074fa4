use std::{collections::HashMap, fs::File, io::Read, path::Path};

use log::{debug, info, trace};
use miette::{bail, miette, IntoDiagnostic, Result, WrapErr};
use oci_distribution::{
    client::{ClientConfig, Config, ImageLayer},
    manifest::{IMAGE_CONFIG_MEDIA_TYPE, IMAGE_LAYER_GZIP_MEDIA_TYPE, IMAGE_LAYER_MEDIA_TYPE},
    secrets::RegistryAuth,
    Client, Reference,
};
use serde::Deserialize;

use crate::block_on;

use super::{opts::PushTarballOpts, PushDriver};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TarballManifest {
    config: String,
    layers: Vec<String>,
}

/// An image loaded from a docker tarball.
pub struct ImageTarball {
    pub config: Config,
    pub layers: Vec<ImageLayer>,
}

impl std::fmt::Debug for ImageTarball {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageTarball")
            .field("config_media_type", &self.config.media_type)
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl ImageTarball {
    /// Reads the config and layers listed in the tarball's `manifest.json`.
    ///
    /// # Errors
    /// Will error if the tarball can't be read, doesn't hold exactly
    /// one image, or is missing a file its manifest lists.
    pub fn load(path: &Path) -> Result<Self> {
        trace!("ImageTarball::load({})", path.display());

        let mut files = read_entries(path)
            .wrap_err_with(|| format!("Failed to read image tarball {}", path.display()))?;

        let manifest = take_file(&mut files, MANIFEST_FILE)?;
        let mut manifests: Vec<TarballManifest> = serde_json::from_slice(&manifest)
            .into_diagnostic()
            .wrap_err_with(|| format!("Invalid {MANIFEST_FILE} in {}", path.display()))?;

        if manifests.len() != 1 {
            bail!(
                "Image tarball {} must hold exactly one image, found {}",
                path.display(),
                manifests.len()
            );
        }
        let TarballManifest { config, layers } = manifests.remove(0);

        let config = Config::new(
            take_file(&mut files, &config)?,
            IMAGE_CONFIG_MEDIA_TYPE.to_string(),
            None,
        );
        let layers = layers
            .iter()
            .map(|name| {
                let data = take_file(&mut files, name)?;
                let media_type = if data.starts_with(&GZIP_MAGIC) {
                    IMAGE_LAYER_GZIP_MEDIA_TYPE
                } else {
                    IMAGE_LAYER_MEDIA_TYPE
                };
                Ok(ImageLayer::new(data, media_type.to_string(), None))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Loaded {} layers from {}", layers.len(), path.display());
        Ok(Self { config, layers })
    }
}

fn read_entries(path: &Path) -> Result<HashMap<String, Vec<u8>>> {
    let mut archive = tar::Archive::new(File::open(path).into_diagnostic()?);
    let mut files = HashMap::new();

    for entry in archive.entries().into_diagnostic()? {
        let mut entry = entry.into_diagnostic()?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = normalize(&entry.path().into_diagnostic()?.to_string_lossy());
        let mut data = Vec::new();
        entry.read_to_end(&mut data).into_diagnostic()?;
        files.insert(name, data);
    }
    Ok(files)
}

fn take_file(files: &mut HashMap<String, Vec<u8>>, name: &str) -> Result<Vec<u8>> {
    files
        .remove(&normalize(name))
        .ok_or_else(|| miette!("Image tarball has no file {name}"))
}

fn normalize(name: &str) -> String {
    name.trim_start_matches("./").to_string()
}

/// Pushes saved images with an OCI registry client.
pub struct OciPushDriver;

impl PushDriver for OciPushDriver {
    fn push_tarball(opts: &PushTarballOpts) -> Result<()> {
        trace!("OciPushDriver::push_tarball({opts:#?})");

        let image = ImageTarball::load(&opts.tarball)?;
        let auth = opts
            .credentials
            .map_or(RegistryAuth::Anonymous, |credentials| {
                RegistryAuth::Basic(
                    credentials.username.clone(),
                    credentials.password.value().to_string(),
                )
            });
        let client = Client::new(ClientConfig::default());

        for tag in opts.tags {
            let image_ref = format!("{}:{tag}", opts.repo);
            let reference: Reference = image_ref
                .parse()
                .into_diagnostic()
                .wrap_err_with(|| format!("Invalid image reference {image_ref}"))?;

            info!("Pushing {} to {image_ref}", opts.tarball.display());
            let response = block_on(client.push(
                &reference,
                &image.layers,
                image.config.clone(),
                &auth,
                None,
            ))?
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to push image to {image_ref}"))?;
            debug!("Pushed manifest {}", response.manifest_url);
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{fs::File, path::Path};

    use kaniko_plugin_utils::string_vec;
    use oci_distribution::manifest::{
        IMAGE_CONFIG_MEDIA_TYPE, IMAGE_LAYER_GZIP_MEDIA_TYPE, IMAGE_LAYER_MEDIA_TYPE,
    };
    use tempfile::TempDir;

    use crate::drivers::{opts::PushTarballOpts, PushDriver};

    use super::{ImageTarball, OciPushDriver};

    const CONFIG: &[u8] = br#"{"architecture":"amd64","os":"linux"}"#;
    const GZIP_LAYER: &[u8] = &[0x1f, 0x8b, 0x08, 0x00];
    const PLAIN_LAYER: &[u8] = b"plain layer";

    fn write_tarball(path: &Path, files: &[(&str, &[u8])]) {
        let mut builder = tar::Builder::new(File::create(path).unwrap());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(u64::try_from(data.len()).unwrap());
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.finish().unwrap();
    }

    fn manifest(layers: &[&str]) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!([{
            "Config": "config.json",
            "RepoTags": ["app:latest"],
            "Layers": layers,
        }]))
        .unwrap()
    }

    #[test]
    fn loads_config_and_layers() {
        let temp_dir = TempDir::new().unwrap();
        let tarball = temp_dir.path().join("image.tar");
        let manifest = manifest(&["gzip/layer.tar.gz", "./plain/layer.tar"]);
        write_tarball(
            &tarball,
            &[
                ("manifest.json", manifest.as_slice()),
                ("config.json", CONFIG),
                ("gzip/layer.tar.gz", GZIP_LAYER),
                ("plain/layer.tar", PLAIN_LAYER),
            ],
        );

        let image = ImageTarball::load(&tarball).unwrap();

        assert_eq!(image.config.data, CONFIG);
        assert_eq!(image.config.media_type, IMAGE_CONFIG_MEDIA_TYPE);
        assert_eq!(image.layers.len(), 2);
        assert_eq!(image.layers[0].media_type, IMAGE_LAYER_GZIP_MEDIA_TYPE);
        assert_eq!(image.layers[1].media_type, IMAGE_LAYER_MEDIA_TYPE);
        assert_eq!(image.layers[1].data, PLAIN_LAYER);
    }

    #[test]
    fn missing_layer() {
        let temp_dir = TempDir::new().unwrap();
        let tarball = temp_dir.path().join("image.tar");
        let manifest = manifest(&["missing.tar"]);
        write_tarball(
            &tarball,
            &[("manifest.json", manifest.as_slice()), ("config.json", CONFIG)],
        );

        let err = ImageTarball::load(&tarball).unwrap_err();
        assert!(err.to_string().contains("missing.tar"));
    }

    #[test]
    fn missing_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let tarball = temp_dir.path().join("image.tar");
        write_tarball(&tarball, &[("config.json", CONFIG)]);

        let err = ImageTarball::load(&tarball).unwrap_err();
        assert!(err.to_string().contains("manifest.json"));
    }

    #[test]
    fn push_fails_on_unreadable_tarball() {
        let temp_dir = TempDir::new().unwrap();
        let tarball = temp_dir.path().join("image.tar");
        std::fs::write(&tarball, "not a tarball").unwrap();
        let tags = string_vec!["latest"];

        let result = OciPushDriver::push_tarball(
            &PushTarballOpts::builder()
                .tarball(tarball.as_path())
                .repo("registry.example.com/app")
                .tags(&tags)
                .build(),
        );

        assert!(result.is_err());
    }
}
