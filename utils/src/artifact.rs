use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, trace};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use thiserror::Error;

const DOCKER_ARTIFACT_V1: &str = "docker/v1";

#[derive(Debug, Error, Diagnostic)]
pub enum ArtifactError {
    #[error("Failed to serialize artifact")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to create {} directory for artifact file", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write artifact to artifact file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The kind of registry an image was pushed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryType {
    Docker,
    #[serde(rename = "ECR")]
    Ecr,
    #[serde(rename = "GCR")]
    Gcr,
    #[serde(rename = "GAR")]
    Gar,
    #[serde(rename = "ACR")]
    Acr,
}

impl std::fmt::Display for RegistryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Docker => "Docker",
            Self::Ecr => "ECR",
            Self::Gcr => "GCR",
            Self::Gar => "GAR",
            Self::Acr => "ACR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub image: String,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Data {
    pub registry_type: RegistryType,
    pub registry_url: String,
    pub images: Vec<Image>,
}

/// Describes the images a build pushed for later pipeline steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerArtifact {
    pub kind: String,
    pub data: Data,
}

impl DockerArtifact {
    #[must_use]
    pub fn new<S>(
        registry_type: RegistryType,
        registry_url: &str,
        image_name: &str,
        digest: &str,
        tags: &[S],
    ) -> Self
    where
        S: AsRef<str>,
    {
        let images = tags
            .iter()
            .map(|tag| Image {
                image: format!("{image_name}:{}", tag.as_ref()),
                digest: digest.into(),
            })
            .collect();

        Self {
            kind: DOCKER_ARTIFACT_V1.into(),
            data: Data {
                registry_type,
                registry_url: registry_url.into(),
                images,
            },
        }
    }

    fn to_pretty_json(&self) -> Result<Vec<u8>, ArtifactError> {
        let mut buf = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"\t"));
        self.serialize(&mut ser).map_err(ArtifactError::Serialize)?;
        Ok(buf)
    }
}

/// Writes a `docker/v1` artifact listing `image_name:tag` for every tag.
///
/// # Errors
/// Will error if the artifact can't be serialized, its directory
/// can't be created, or the file can't be written.
pub fn write_artifact_file<P, S>(
    path: P,
    registry_type: RegistryType,
    registry_url: &str,
    image_name: &str,
    digest: &str,
    tags: &[S],
) -> Result<(), ArtifactError>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    trace!(
        "write_artifact_file({}, {registry_type}, {registry_url}, {image_name}, {digest})",
        path.display()
    );

    let artifact = DockerArtifact::new(registry_type, registry_url, image_name, digest, tags);
    let json = artifact.to_pretty_json()?;

    if !path.exists() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ArtifactError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    fs::File::create(path)
        .and_then(|mut file| file.write_all(&json))
        .map_err(|source| ArtifactError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    debug!("Wrote artifact file to {}", path.display());
    Ok(())
}
