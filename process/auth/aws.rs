//! Calls to the AWS APIs that manage ECR repositories and
//! exchange an assumed role for a registry login.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_ecr::{config::Credentials, error::DisplayErrorContext};
use bon::Builder;
use kaniko_plugin_utils::{
    constants::ECR_ROLE_SESSION_NAME, docker_config::RegistryCredentials, secret::SecretValue,
};
use log::{debug, info, trace};
use miette::{bail, miette, Result};

use crate::block_on;

use super::ecr::{decode_authorization_token, is_registry_public};

/// The region and keys used for AWS API calls.
///
/// Without keys the default credential chain is used.
#[derive(Debug, Clone, Copy, Builder)]
pub struct AwsSession<'scope> {
    #[builder(default)]
    pub region: &'scope str,

    #[builder(default)]
    pub access_key: &'scope str,

    pub secret_key: Option<&'scope SecretValue>,
}

impl AwsSession<'_> {
    /// Assumes a role and exchanges it for ECR registry credentials.
    ///
    /// # Errors
    /// Will error if the role can't be assumed or ECR doesn't return
    /// a valid authorization token.
    pub fn assume_role_login(
        &self,
        role_arn: &str,
        external_id: &str,
    ) -> Result<RegistryCredentials> {
        trace!("AwsSession::assume_role_login({role_arn})");
        block_on(self.assume_role_login_async(role_arn, external_id))?
    }

    /// Creates the repository, leaving an existing one alone.
    ///
    /// # Errors
    /// Will error if the registry or repo is empty or the repository
    /// can't be created.
    pub fn create_repository(&self, registry: &str, repo: &str) -> Result<()> {
        trace!("AwsSession::create_repository({registry}, {repo})");

        if registry.is_empty() {
            bail!("Registry must be specified");
        }
        if repo.is_empty() {
            bail!("Repo must be specified");
        }

        block_on(self.create_repository_async(registry, repo))?
    }

    /// Sets the lifecycle policy of a private repository.
    ///
    /// # Errors
    /// Will error if the policy is rejected.
    pub fn put_lifecycle_policy(&self, repo: &str, policy: &str) -> Result<()> {
        trace!("AwsSession::put_lifecycle_policy({repo})");
        block_on(self.put_lifecycle_policy_async(repo, policy))?
    }

    /// Sets the repository policy on a public or private repository.
    ///
    /// # Errors
    /// Will error if the policy is rejected.
    pub fn set_repository_policy(&self, registry: &str, repo: &str, policy: &str) -> Result<()> {
        trace!("AwsSession::set_repository_policy({registry}, {repo})");
        block_on(self.set_repository_policy_async(registry, repo, policy))?
    }

    async fn sdk_config(&self) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if !self.region.is_empty() {
            loader = loader.region(Region::new(self.region.to_string()));
        }

        if let Some(secret_key) = self
            .secret_key
            .filter(|key| !self.access_key.is_empty() && !key.is_empty())
        {
            loader = loader.credentials_provider(Credentials::new(
                self.access_key,
                secret_key.value(),
                None,
                None,
                ECR_ROLE_SESSION_NAME,
            ));
        }

        loader.load().await
    }

    async fn assume_role_login_async(
        &self,
        role_arn: &str,
        external_id: &str,
    ) -> Result<RegistryCredentials> {
        let config = self.sdk_config().await;

        let mut request = aws_sdk_sts::Client::new(&config)
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(ECR_ROLE_SESSION_NAME);
        if !external_id.is_empty() {
            request = request.external_id(external_id);
        }
        let output = request.send().await.map_err(|e| {
            miette!("Failed to assume role {role_arn}: {}", DisplayErrorContext(&e))
        })?;
        let role = output
            .credentials()
            .ok_or_else(|| miette!("Assuming role {role_arn} returned no credentials"))?;
        debug!("Assumed role {role_arn}");

        let ecr_config = aws_sdk_ecr::config::Builder::from(&config)
            .credentials_provider(Credentials::new(
                role.access_key_id(),
                role.secret_access_key(),
                Some(role.session_token().to_string()),
                None,
                ECR_ROLE_SESSION_NAME,
            ))
            .build();
        let output = aws_sdk_ecr::Client::from_conf(ecr_config)
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| miette!("Failed to get ECR auth: {}", DisplayErrorContext(&e)))?;
        let data = output
            .authorization_data()
            .first()
            .ok_or_else(|| miette!("ECR returned no authorization data"))?;

        decode_authorization_token(
            data.authorization_token().unwrap_or_default(),
            data.proxy_endpoint().unwrap_or_default(),
        )
    }

    async fn create_repository_async(&self, registry: &str, repo: &str) -> Result<()> {
        let config = self.sdk_config().await;

        let exists = if is_registry_public(registry) {
            match aws_sdk_ecrpublic::Client::new(&config)
                .create_repository()
                .repository_name(repo)
                .send()
                .await
            {
                Ok(_) => false,
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|e| e.is_repository_already_exists_exception()) =>
                {
                    true
                }
                Err(e) => bail!(
                    "Failed to create repository {repo}: {}",
                    DisplayErrorContext(&e)
                ),
            }
        } else {
            match aws_sdk_ecr::Client::new(&config)
                .create_repository()
                .repository_name(repo)
                .send()
                .await
            {
                Ok(_) => false,
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|e| e.is_repository_already_exists_exception()) =>
                {
                    true
                }
                Err(e) => bail!(
                    "Failed to create repository {repo}: {}",
                    DisplayErrorContext(&e)
                ),
            }
        };

        if exists {
            debug!("Repository {repo} already exists");
        } else {
            info!("Created repository {repo}");
        }
        Ok(())
    }

    async fn put_lifecycle_policy_async(&self, repo: &str, policy: &str) -> Result<()> {
        let config = self.sdk_config().await;

        aws_sdk_ecr::Client::new(&config)
            .put_lifecycle_policy()
            .repository_name(repo)
            .lifecycle_policy_text(policy)
            .send()
            .await
            .map_err(|e| {
                miette!("Error uploading ECR lifecycle policy: {}", DisplayErrorContext(&e))
            })?;

        info!("Uploaded lifecycle policy for {repo}");
        Ok(())
    }

    async fn set_repository_policy_async(
        &self,
        registry: &str,
        repo: &str,
        policy: &str,
    ) -> Result<()> {
        let config = self.sdk_config().await;

        let result = if is_registry_public(registry) {
            aws_sdk_ecrpublic::Client::new(&config)
                .set_repository_policy()
                .repository_name(repo)
                .policy_text(policy)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| DisplayErrorContext(&e).to_string())
        } else {
            aws_sdk_ecr::Client::new(&config)
                .set_repository_policy()
                .repository_name(repo)
                .policy_text(policy)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| DisplayErrorContext(&e).to_string())
        };
        result.map_err(|e| miette!("Error uploading ECR repository policy: {e}"))?;

        info!("Uploaded repository policy for {repo}");
        Ok(())
    }
}
