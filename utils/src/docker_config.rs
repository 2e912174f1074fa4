//! Builder for the docker `config.json` the executor reads
//! registry credentials from.

use std::{
    fs,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD, Engine};
use bon::Builder;
use indexmap::IndexMap;
use log::{trace, warn};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constants::{DOCKER_CONFIG_FILE, REGISTRY_HUB_V2, REGISTRY_V1, REGISTRY_V2},
    secret::SecretValue,
    string,
};

#[derive(Debug, Error, Diagnostic)]
pub enum DockerConfigError {
    #[error("Username must be specified for registry: {registry}")]
    MissingUsername { registry: String },

    #[error("Password must be specified for registry: {registry}")]
    MissingPassword { registry: String },

    #[error("Failed to serialize docker config json")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to create {} directory", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write docker config to path: {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The username and password used to login to a registry.
#[derive(Debug, Clone, Builder)]
pub struct RegistryCredentials {
    #[builder(default, into)]
    pub registry: String,

    #[builder(default, into)]
    pub username: String,

    #[builder(default, into)]
    pub password: SecretValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub auth: String,
}

/// The contents of a docker `config.json`.
///
/// Registries are kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    auths: IndexMap<String, Auth>,

    #[serde(
        default,
        rename = "credHelpers",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    cred_helpers: IndexMap<String, String>,
}

impl DockerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn auths(&self) -> &IndexMap<String, Auth> {
        &self.auths
    }

    #[must_use]
    pub const fn cred_helpers(&self) -> &IndexMap<String, String> {
        &self.cred_helpers
    }

    /// Stores the base64 encoded `username:password` for a registry.
    pub fn set_auth<R, U>(&mut self, registry: R, username: U, password: &SecretValue)
    where
        R: Into<String>,
        U: AsRef<str>,
    {
        let auth = STANDARD.encode(format!("{}:{}", username.as_ref(), password.value()));
        self.auths.insert(registry.into(), Auth { auth });
    }

    /// Decodes the stored credentials for a registry.
    #[must_use]
    pub fn credentials(&self, registry: &str) -> Option<RegistryCredentials> {
        let decoded = STANDARD.decode(&self.auths.get(registry)?.auth).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;

        Some(
            RegistryCredentials::builder()
                .registry(registry)
                .username(username)
                .password(password)
                .build(),
        )
    }

    /// Has the executor ask an external credential helper for
    /// the registry's credentials.
    pub fn set_cred_helper<R, H>(&mut self, registry: R, helper: H)
    where
        R: Into<String>,
        H: Into<String>,
    {
        self.cred_helpers.insert(registry.into(), helper.into());
    }

    /// Adds the credentials for a registry.
    ///
    /// Credentials without a registry are skipped so optional
    /// registries can be left unset. Docker Hub's v2 URLs are
    /// stored under the v1 URL as the executor only supports v1 auth.
    ///
    /// # Errors
    /// Will error if the username or password is empty.
    pub fn add(&mut self, credentials: &RegistryCredentials) -> Result<(), DockerConfigError> {
        trace!("DockerConfig::add({credentials:?})");

        if credentials.registry.is_empty() {
            trace!("No registry set, skipping credentials");
            return Ok(());
        }

        let registry = if credentials.registry == REGISTRY_V2
            || credentials.registry == REGISTRY_HUB_V2
        {
            warn!(
                "Docker v2 registry '{}' is not supported in kaniko. Refer issue: https://github.com/GoogleContainerTools/kaniko/issues/1209",
                credentials.registry
            );
            warn!("Using v1 registry instead: {REGISTRY_V1}");
            string!(REGISTRY_V1)
        } else {
            credentials.registry.clone()
        };

        if credentials.username.is_empty() {
            return Err(DockerConfigError::MissingUsername { registry });
        }
        if credentials.password.is_empty() {
            return Err(DockerConfigError::MissingPassword { registry });
        }

        self.set_auth(registry, &credentials.username, &credentials.password);
        Ok(())
    }

    /// Adds each set of credentials in order.
    ///
    /// # Errors
    /// Will error on the first invalid set of credentials.
    pub fn add_all<'a, I>(&mut self, credentials: I) -> Result<(), DockerConfigError>
    where
        I: IntoIterator<Item = &'a RegistryCredentials>,
    {
        credentials
            .into_iter()
            .try_for_each(|creds| self.add(creds))
    }

    /// Serializes the config into its JSON form.
    ///
    /// # Errors
    /// Will error if serialization fails.
    pub fn to_json(&self) -> Result<String, DockerConfigError> {
        serde_json::to_string(self).map_err(DockerConfigError::Serialize)
    }

    /// Writes the config as `config.json` inside `dir`, creating
    /// the directory first. Returns the path of the written file.
    ///
    /// # Errors
    /// Will error if the directory can't be created or the file can't be written.
    pub fn write_to<P>(&self, dir: P) -> Result<PathBuf, DockerConfigError>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref();
        trace!("DockerConfig::write_to({})", dir.display());

        let json = self.to_json()?;

        fs::create_dir_all(dir).map_err(|source| DockerConfigError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(DOCKER_CONFIG_FILE);
        fs::write(&path, json).map_err(|source| DockerConfigError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use rstest::rstest;
    use tempfile::TempDir;

    use crate::constants::{REGISTRY_ECR_PUBLIC, REGISTRY_HUB_V2, REGISTRY_V1, REGISTRY_V2};

    use super::{DockerConfig, DockerConfigError, RegistryCredentials};

    fn creds(registry: &str, username: &str, password: &str) -> RegistryCredentials {
        RegistryCredentials::builder()
            .registry(registry)
            .username(username)
            .password(password)
            .build()
    }

    #[test]
    fn new_config_is_empty() {
        let config = DockerConfig::new();

        assert!(config.auths().is_empty());
        assert!(config.cred_helpers().is_empty());
        assert_eq!(config.to_json().unwrap(), r#"{"auths":{}}"#);
    }

    #[test]
    fn set_auth_encodes_credentials() {
        let mut config = DockerConfig::new();
        config.set_auth(REGISTRY_V1, "test", &"password".into());

        assert_eq!(config.auths()[REGISTRY_V1].auth, "dGVzdDpwYXNzd29yZA==");
    }

    #[test]
    fn set_cred_helper() {
        let mut config = DockerConfig::new();
        config.set_cred_helper(REGISTRY_ECR_PUBLIC, "ecr-login");

        assert_eq!(config.cred_helpers()[REGISTRY_ECR_PUBLIC], "ecr-login");
        assert_eq!(
            config.to_json().unwrap(),
            r#"{"auths":{},"credHelpers":{"public.ecr.aws":"ecr-login"}}"#
        );
    }

    #[test]
    fn skips_empty_registry() {
        let mut config = DockerConfig::new();
        config.add(&creds("", "user", "pass")).unwrap();

        assert!(config.auths().is_empty());
    }

    #[rstest]
    #[case::index(REGISTRY_V2)]
    #[case::hub(REGISTRY_HUB_V2)]
    fn rewrites_v2_registry(#[case] registry: &str) {
        let mut config = DockerConfig::new();
        config.add(&creds(registry, "user", "pass")).unwrap();

        assert_eq!(config.auths().len(), 1);
        assert!(config.auths().contains_key(REGISTRY_V1));
    }

    #[test]
    fn missing_username() {
        let err = DockerConfig::new()
            .add(&creds("r", "", "p"))
            .unwrap_err();

        assert!(matches!(err, DockerConfigError::MissingUsername { ref registry } if registry == "r"));
        assert_eq!(err.to_string(), "Username must be specified for registry: r");
    }

    #[test]
    fn missing_password_names_rewritten_registry() {
        let err = DockerConfig::new()
            .add(&creds(REGISTRY_V2, "user", ""))
            .unwrap_err();

        assert!(
            matches!(err, DockerConfigError::MissingPassword { ref registry } if registry == REGISTRY_V1)
        );
    }

    #[test]
    fn add_is_idempotent() {
        let mut config = DockerConfig::new();
        let creds = creds("gcr.io", "user", "pass");
        config.add(&creds).unwrap();
        config.add(&creds).unwrap();

        assert_eq!(config.auths().len(), 1);
    }

    #[test]
    fn add_all_stops_at_first_error() {
        let mut config = DockerConfig::new();
        let result = config.add_all(&[
            creds("gcr.io", "user", "pass"),
            creds("ghcr.io", "", "pass"),
            creds("quay.io", "user", "pass"),
        ]);

        assert!(result.is_err());
        assert!(config.auths().contains_key("gcr.io"));
        assert!(!config.auths().contains_key("quay.io"));
    }

    #[test]
    fn write_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested").join(".docker");

        let mut config = DockerConfig::new();
        config.set_cred_helper(REGISTRY_ECR_PUBLIC, "ecr-login");
        config
            .add_all(&[
                creds(REGISTRY_V1, "user1", "pass1"),
                creds("gcr.io", "user2", "pass2"),
            ])
            .unwrap();

        let path = config.write_to(&dir).unwrap();
        assert_eq!(path, dir.join("config.json"));

        let from_file: DockerConfig =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(from_file.auths(), config.auths());
        assert_eq!(from_file.cred_helpers(), config.cred_helpers());
        assert_eq!(
            from_file.auths().keys().collect::<Vec<_>>(),
            vec![REGISTRY_V1, "gcr.io"]
        );
    }

    #[test]
    fn write_fails_when_dir_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file");
        fs::write(&file, "").unwrap();

        let err = DockerConfig::new().write_to(&file).unwrap_err();

        assert!(matches!(err, DockerConfigError::CreateDir { .. }));
    }

    #[test]
    fn write_fails_when_config_is_a_dir() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("config.json")).unwrap();

        let err = DockerConfig::new().write_to(temp_dir.path()).unwrap_err();

        assert!(
            matches!(err, DockerConfigError::Write { ref path, .. } if path.ends_with("config.json"))
        );
    }

    #[test]
    fn credentials_for_registry() {
        let mut config = DockerConfig::new();
        config.add(&creds("myregistry.azurecr.io", "user", "p:ss")).unwrap();

        let credentials = config.credentials("myregistry.azurecr.io").unwrap();

        assert_eq!(credentials.username, "user");
        assert_eq!(credentials.password.value(), "p:ss");
        assert!(config.credentials("gcr.io").is_none());
    }
}
