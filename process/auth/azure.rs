use std::time::Duration;

use bon::Builder;
use kaniko_plugin_utils::{
    constants::{
        ACR_USERNAME, AZURE_DEFAULT_AUTHORITY_HOST, AZURE_DEFAULT_RESOURCE, AZURE_IMDS_TOKEN_URL,
        AZURE_MAX_PAGE_COUNT, AZURE_PORTAL_REGISTRY_URL,
    },
    docker_config::RegistryCredentials,
    secret::SecretValue,
};
use log::{debug, trace, warn};
use miette::{bail, Diagnostic, IntoDiagnostic, Result, WrapErr};
use reqwest::{
    blocking::{Client, RequestBuilder},
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;

use super::RegistryLogin;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const IMDS_API_VERSION: &str = "2018-02-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error, Diagnostic)]
pub enum AzureAuthError {
    #[error("Request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("Failed to decode the response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("The token response from {url} has no access token")]
    MissingAccessToken { url: String },

    #[error("The token exchange with {registry} returned no refresh token")]
    MissingRefreshToken { registry: String },

    #[error("Received an empty registry id for {registry}")]
    EmptyRegistryId { registry: String },

    #[error("No registry named {registry} was found")]
    #[diagnostic(help("Check that the subscription id owns the registry"))]
    RegistryNotFound { registry: String },
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<SecretValue>,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    #[serde(default)]
    refresh_token: Option<SecretValue>,
}

/// One page of an Azure Resource Manager resource listing.
#[derive(Debug, Default, Deserialize)]
pub struct ResourcesPage {
    #[serde(default)]
    pub value: Vec<Resource>,

    #[serde(default, rename = "nextLink")]
    pub next_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub id: String,
}

/// Login settings for Azure Container Registry.
#[derive(Debug, Clone, Builder)]
pub struct AcrAuth<'scope> {
    #[builder(default)]
    pub registry: &'scope str,

    #[builder(default)]
    pub tenant_id: &'scope str,

    #[builder(default)]
    pub client_id: &'scope str,

    pub client_secret: Option<&'scope SecretValue>,

    /// An OIDC id token from the CI system used as a client assertion.
    pub oidc_token: Option<&'scope SecretValue>,

    /// Used to look up the portal URL of the registry.
    #[builder(default)]
    pub subscription_id: &'scope str,

    #[builder(default = AZURE_DEFAULT_AUTHORITY_HOST)]
    pub authority_host: &'scope str,

    /// Credentials for pulling base images from another registry.
    pub base_image: Option<&'scope RegistryCredentials>,

    #[builder(default)]
    pub no_push: bool,
}

/// The result of an ACR login.
#[derive(Debug, Default)]
pub struct AcrLogin {
    pub login: RegistryLogin,

    /// Where the pushed image can be viewed in the Azure portal.
    pub public_url: Option<String>,
}

impl AcrAuth<'_> {
    /// Exchanges Azure AD credentials for an ACR refresh token and
    /// builds the docker config the executor pushes with.
    ///
    /// When not pushing, failures to authenticate are logged and
    /// only the base image credentials are configured.
    ///
    /// # Errors
    /// Will error if the registry is missing, if authentication fails
    /// while pushing, or if the base image credentials are incomplete.
    pub fn login(&self) -> Result<AcrLogin> {
        trace!("AcrAuth::login({self:?})");

        if self.registry.is_empty() {
            bail!("Registry must be specified");
        }

        let mut acr_login = AcrLogin::default();

        match self.registry_token() {
            Ok((refresh_token, public_url)) => {
                acr_login
                    .login
                    .config
                    .set_auth(self.registry, ACR_USERNAME, &refresh_token);
                acr_login.public_url = public_url;
            }
            Err(e) if self.no_push => {
                warn!("Not pushing, ignoring ACR authentication failure: {e:?}");
            }
            Err(e) => return Err(e),
        }

        if let Some(base_image) = self.base_image {
            acr_login.login.config.add(base_image)?;
        } else {
            warn!(
                "To ensure consistent and reliable pipeline execution, we recommend setting up a Base Image Connector. \
                While optional at this time, configuring it helps prevent failures caused by Docker Hub's rate limits."
            );
        }

        Ok(acr_login)
    }

    fn registry_token(&self) -> Result<(SecretValue, Option<String>)> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .into_diagnostic()
            .wrap_err("Failed to create HTTP client")?;

        let oidc_token = self.oidc_token.filter(|token| !token.is_empty());
        let client_secret = self.client_secret.filter(|secret| !secret.is_empty());

        let aad_token = match (oidc_token, client_secret) {
            (Some(oidc_token), _) => {
                self.require_client("OIDC")?;
                debug!("Using OIDC authentication flow");
                aad_token_via_client_assertion(
                    &client,
                    self.authority_host,
                    self.tenant_id,
                    self.client_id,
                    oidc_token,
                    AZURE_DEFAULT_RESOURCE,
                )
                .wrap_err("Failed to get AAD token via OIDC")?
            }
            (None, Some(client_secret)) => {
                self.require_client("client secret")?;
                debug!("Using client secret authentication flow");
                aad_token_via_client_secret(
                    &client,
                    self.authority_host,
                    self.tenant_id,
                    self.client_id,
                    client_secret,
                    AZURE_DEFAULT_RESOURCE,
                )
                .wrap_err("Failed to get AAD token via client secret")?
            }
            (None, None) => {
                if !self.tenant_id.is_empty() && !self.client_id.is_empty() {
                    warn!("A client id was given without a secret or OIDC token, using managed identity");
                }
                debug!("Using managed identity");
                let token = managed_identity_token(&client, AZURE_DEFAULT_RESOURCE)
                    .wrap_err("Failed to get AAD token via managed identity")?;
                if self.tenant_id.is_empty() {
                    bail!("Tenant id is required for the ACR token exchange");
                }
                token
            }
        };

        let public_url = public_url(&client, &aad_token, self.registry, self.subscription_id);

        let refresh_token =
            fetch_acr_refresh_token(&client, self.tenant_id, &aad_token, self.registry)
                .wrap_err("Failed to fetch ACR token")?;

        Ok((refresh_token, public_url))
    }

    fn require_client(&self, flow: &str) -> Result<()> {
        if self.tenant_id.is_empty() || self.client_id.is_empty() {
            bail!("Tenant id and client id must be provided for {flow} authentication");
        }
        Ok(())
    }
}

/// The Azure AD v2 token endpoint for a tenant.
#[must_use]
pub fn token_endpoint(authority_host: &str, tenant_id: &str) -> String {
    let authority_host = if authority_host.is_empty() {
        AZURE_DEFAULT_AUTHORITY_HOST
    } else {
        authority_host.trim_end_matches('/')
    };
    format!("{authority_host}/{tenant_id}/oauth2/v2.0/token")
}

/// The `.default` scope of a resource.
#[must_use]
pub fn scope(resource: &str) -> String {
    let resource = if resource.is_empty() {
        AZURE_DEFAULT_RESOURCE
    } else {
        resource
    };
    format!("{resource}.default")
}

#[must_use]
pub fn client_assertion_form<'a>(
    client_id: &'a str,
    oidc_token: &'a str,
    scope: &'a str,
) -> [(&'static str, &'a str); 5] {
    [
        ("client_id", client_id),
        ("scope", scope),
        ("grant_type", "client_credentials"),
        ("client_assertion_type", CLIENT_ASSERTION_TYPE),
        ("client_assertion", oidc_token),
    ]
}

#[must_use]
pub fn client_secret_form<'a>(
    client_id: &'a str,
    client_secret: &'a str,
    scope: &'a str,
) -> [(&'static str, &'a str); 4] {
    [
        ("client_id", client_id),
        ("scope", scope),
        ("grant_type", "client_credentials"),
        ("client_secret", client_secret),
    ]
}

/// Exchanges a CI OIDC token for an Azure AD access token
/// with the client credentials flow and a JWT bearer assertion.
///
/// # Errors
/// Will error if the request fails or no access token is returned.
pub fn aad_token_via_client_assertion(
    client: &Client,
    authority_host: &str,
    tenant_id: &str,
    client_id: &str,
    oidc_token: &SecretValue,
    resource: &str,
) -> Result<SecretValue, AzureAuthError> {
    let url = token_endpoint(authority_host, tenant_id);
    let scope = scope(resource);
    let form = client_assertion_form(client_id, oidc_token.value(), &scope);

    access_token(&url, send(&url, client.post(&url).form(&form))?)
}

/// Gets an Azure AD access token for a service principal secret.
///
/// # Errors
/// Will error if the request fails or no access token is returned.
pub fn aad_token_via_client_secret(
    client: &Client,
    authority_host: &str,
    tenant_id: &str,
    client_id: &str,
    client_secret: &SecretValue,
    resource: &str,
) -> Result<SecretValue, AzureAuthError> {
    let url = token_endpoint(authority_host, tenant_id);
    let scope = scope(resource);
    let form = client_secret_form(client_id, client_secret.value(), &scope);

    access_token(&url, send(&url, client.post(&url).form(&form))?)
}

/// Gets an access token for the identity assigned to the machine
/// from the instance metadata service.
///
/// # Errors
/// Will error if the metadata service can't be reached or returns no token.
pub fn managed_identity_token(
    client: &Client,
    resource: &str,
) -> Result<SecretValue, AzureAuthError> {
    let url = AZURE_IMDS_TOKEN_URL;
    let request = client
        .get(url)
        .header("Metadata", "true")
        .query(&[("api-version", IMDS_API_VERSION), ("resource", resource)]);

    access_token(url, send(url, request)?)
}

fn access_token(url: &str, response: TokenResponse) -> Result<SecretValue, AzureAuthError> {
    response
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AzureAuthError::MissingAccessToken { url: url.into() })
}

/// Exchanges an Azure AD access token for an ACR refresh token.
///
/// # Errors
/// Will error if the exchange fails or no refresh token is returned.
pub fn fetch_acr_refresh_token(
    client: &Client,
    tenant_id: &str,
    aad_token: &SecretValue,
    registry: &str,
) -> Result<SecretValue, AzureAuthError> {
    let url = format!("https://{registry}/oauth2/exchange");
    let form = [
        ("grant_type", "access_token"),
        ("service", registry),
        ("tenant", tenant_id),
        ("access_token", aad_token.value()),
    ];

    let response: ExchangeResponse = send(&url, client.post(&url).form(&form))?;
    response
        .refresh_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AzureAuthError::MissingRefreshToken {
            registry: registry.into(),
        })
}

/// Looks up the Azure portal page of the registry. Failures are
/// logged and never fail the build.
pub fn public_url(
    client: &Client,
    aad_token: &SecretValue,
    registry: &str,
    subscription_id: &str,
) -> Option<String> {
    if subscription_id.is_empty() {
        debug!("No subscription id, skipping registry portal lookup");
        return None;
    }

    let first_url = resources_url(subscription_id, registry);
    let result = find_registry_id(registry, &first_url, |url| {
        send(url, client.get(url).bearer_auth(aad_token.value()))
    });

    match result {
        Ok(id) => Some(portal_url(&id)),
        Err(e) => {
            warn!("Failed to get the public URL of {registry}: {e}");
            None
        }
    }
}

/// The Resource Manager query listing registries named after
/// the first label of the registry host.
#[must_use]
pub fn resources_url(subscription_id: &str, registry: &str) -> String {
    let name = registry.split('.').next().unwrap_or_default();
    format!(
        "https://management.azure.com/subscriptions/{subscription_id}/resources\
        ?$filter=resourceType%20eq%20'Microsoft.ContainerRegistry/registries'%20and%20name%20eq%20'{name}'\
        &api-version=2021-04-01&$select=id"
    )
}

#[must_use]
pub fn portal_url(registry_id: &str) -> String {
    format!(
        "{AZURE_PORTAL_REGISTRY_URL}{}",
        urlencoding::encode(registry_id)
    )
}

/// Follows `nextLink` until a page lists a registry.
///
/// # Errors
/// Will error if a page can't be fetched, the registry id is empty,
/// or no page lists the registry.
pub fn find_registry_id<F>(
    registry: &str,
    first_url: &str,
    mut fetch: F,
) -> Result<String, AzureAuthError>
where
    F: FnMut(&str) -> Result<ResourcesPage, AzureAuthError>,
{
    let mut url = first_url.to_string();

    for page in 0..AZURE_MAX_PAGE_COUNT {
        trace!("Fetching resources page {page}");
        let ResourcesPage { value, next_link } = fetch(&url)?;

        if let Some(resource) = value.into_iter().next() {
            if resource.id.is_empty() {
                return Err(AzureAuthError::EmptyRegistryId {
                    registry: registry.into(),
                });
            }
            return Ok(resource.id);
        }

        match next_link.filter(|link| !link.is_empty()) {
            Some(next_link) => url = next_link,
            None => break,
        }
    }

    Err(AzureAuthError::RegistryNotFound {
        registry: registry.into(),
    })
}

fn send<T>(url: &str, request: RequestBuilder) -> Result<T, AzureAuthError>
where
    T: DeserializeOwned,
{
    let request_error = |source| AzureAuthError::Request {
        url: url.into(),
        source,
    };

    let response = request.send().map_err(request_error)?;
    let status = response.status();
    let body = response.text().map_err(request_error)?;

    if !status.is_success() {
        return Err(AzureAuthError::Status {
            url: url.into(),
            status,
            body,
        });
    }

    serde_json::from_str(&body).map_err(|source| AzureAuthError::Decode {
        url: url.into(),
        source,
    })
}
