use std::{
    fs,
    path::{Path, PathBuf},
};

use bon::Builder;
use kaniko_plugin_utils::{
    constants::{
        DEFAULT_HOME_DIR, GCP_CREDENTIALS_PATH, GCP_IAM_CREDENTIALS_URL, GCP_ID_TOKEN_TYPE,
        GCP_STS_TOKEN_URL, GOOGLE_APPLICATION_CREDENTIALS,
    },
    docker_config::RegistryCredentials,
    secret::SecretValue,
    string,
};
use log::{debug, info, trace, warn};
use miette::{bail, IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};

use super::RegistryLogin;

const EXTERNAL_ACCOUNT: &str = "external_account";

/// Workload identity federation settings used to trade a CI
/// OIDC token for Google credentials.
#[derive(Debug, Clone, Copy, Builder)]
pub struct WorkloadIdentity<'scope> {
    pub oidc_token: &'scope SecretValue,
    pub project_number: &'scope str,
    pub pool_id: &'scope str,
    pub provider_id: &'scope str,

    /// Service account to impersonate with the federated token.
    #[builder(default)]
    pub service_account_email: &'scope str,
}

/// Login settings for GCR and Artifact Registry.
#[derive(Debug, Clone, Builder)]
pub struct GcpAuth<'scope> {
    /// A service account JSON key.
    pub json_key: Option<&'scope SecretValue>,

    pub workload_identity: Option<WorkloadIdentity<'scope>>,

    /// Credentials for pulling base images from another registry.
    pub base_image: Option<&'scope RegistryCredentials>,

    /// The pipeline workspace. The OIDC token is stored beneath it.
    #[builder(default)]
    pub workspace: &'scope str,

    /// Where the credentials file for the executor is written.
    #[builder(default = Path::new(GCP_CREDENTIALS_PATH), into)]
    pub credentials_path: &'scope Path,

    #[builder(default)]
    pub no_push: bool,
}

/// An `external_account` credentials document pointing Google's
/// auth libraries at a file holding the OIDC token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAccount {
    #[serde(rename = "type")]
    pub kind: String,
    pub audience: String,
    pub subject_token_type: String,
    pub token_url: String,
    pub credential_source: CredentialSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_impersonation_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSource {
    pub file: PathBuf,
}

impl ExternalAccount {
    #[must_use]
    pub fn new(identity: &WorkloadIdentity, id_token_path: &Path) -> Self {
        Self {
            kind: string!(EXTERNAL_ACCOUNT),
            audience: format!(
                "//iam.googleapis.com/projects/{}/locations/global/workloadIdentityPools/{}/providers/{}",
                identity.project_number, identity.pool_id, identity.provider_id,
            ),
            subject_token_type: string!(GCP_ID_TOKEN_TYPE),
            token_url: string!(GCP_STS_TOKEN_URL),
            credential_source: CredentialSource {
                file: id_token_path.to_path_buf(),
            },
            service_account_impersonation_url: (!identity.service_account_email.is_empty()).then(
                || {
                    format!(
                        "{GCP_IAM_CREDENTIALS_URL}/{}:generateAccessToken",
                        identity.service_account_email
                    )
                },
            ),
        }
    }
}

impl GcpAuth<'_> {
    /// Writes the credentials file the executor authenticates with and
    /// builds the docker config holding any base image credentials.
    ///
    /// # Errors
    /// Will error if no credentials are given while pushing or if a
    /// credentials file can't be written.
    pub fn login(&self) -> Result<RegistryLogin> {
        trace!("GcpAuth::login({self:?})");

        let mut login = RegistryLogin::default();

        match (self.workload_identity, self.json_key.filter(|key| !key.is_empty())) {
            (Some(identity), _) => {
                info!("Using workload identity federation");
                self.write_external_account(&identity)?;
                login.envs.push(self.credentials_env());
            }
            (None, Some(json_key)) => {
                debug!("Using JSON key");
                write_file(self.credentials_path, json_key.value())?;
                login.envs.push(self.credentials_env());
            }
            (None, None) if self.no_push => {
                debug!("Not pushing, skipping GCP login");
            }
            (None, None) => {
                bail!(
                    help = "Set the json key or the OIDC workload identity settings",
                    "GCP credentials must be specified"
                );
            }
        }

        match self.base_image {
            Some(base_image) => login.config.add(base_image)?,
            None => warn!(
                "No base image registry credentials set. Pulls from Docker Hub may hit its rate limits."
            ),
        }

        Ok(login)
    }

    fn credentials_env(&self) -> (String, SecretValue) {
        (
            string!(GOOGLE_APPLICATION_CREDENTIALS),
            self.credentials_path.display().to_string().into(),
        )
    }

    fn write_external_account(&self, identity: &WorkloadIdentity) -> Result<()> {
        let id_token_dir = id_token_dir(self.workspace);
        fs::create_dir_all(&id_token_dir)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to create {} directory", id_token_dir.display()))?;

        let id_token_path = id_token_dir.join("id_token");
        write_file(&id_token_path, identity.oidc_token.value())?;
        debug!("Wrote OIDC token to {}", id_token_path.display());

        let account = ExternalAccount::new(identity, &id_token_path);
        let json = serde_json::to_string_pretty(&account).into_diagnostic()?;
        write_file(self.credentials_path, &json)?;
        debug!("Wrote credentials to {}", self.credentials_path.display());

        Ok(())
    }
}

/// The directory the OIDC token is stored in. An unset or root
/// workspace falls back to the default home directory.
#[must_use]
pub fn id_token_dir(workspace: &str) -> PathBuf {
    let home = match workspace {
        "" | "/" => {
            debug!("No usable workspace, using {DEFAULT_HOME_DIR}");
            DEFAULT_HOME_DIR
        }
        workspace => workspace,
    };
    Path::new(home).join("tmp")
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to create {} directory", parent.display()))?;
    }
    fs::write(path, contents)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to write {}", path.display()))
}
