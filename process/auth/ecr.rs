use base64::{engine::general_purpose::STANDARD, Engine};
use bon::Builder;
use kaniko_plugin_utils::{
    constants::{
        AWS_ACCESS_KEY_ID, AWS_REGION, AWS_SECRET_ACCESS_KEY, ECR_LOGIN_HELPER,
        ECR_MIN_IMPLICIT_AUTH_VERSION, REGISTRY_ECR_PUBLIC, REGISTRY_V1,
    },
    docker_config::RegistryCredentials,
    secret::SecretValue,
    semver::Version,
    string,
};
use log::{debug, trace};
use miette::{bail, miette, IntoDiagnostic, Result, WrapErr};

use super::RegistryLogin;

/// ECR Public only serves its API from this region.
const ECR_PUBLIC_REGION: &str = "us-east-1";

/// Login settings for Amazon ECR.
#[derive(Debug, Clone, Builder)]
pub struct EcrAuth<'scope> {
    #[builder(default)]
    pub registry: &'scope str,

    #[builder(default)]
    pub region: &'scope str,

    #[builder(default)]
    pub access_key: &'scope str,

    pub secret_key: Option<&'scope SecretValue>,

    /// An authorization token fetched ahead of time, for example
    /// with `aws ecr get-authorization-token`.
    pub authorization_token: Option<&'scope SecretValue>,

    /// Docker Hub credentials for pulling base images.
    #[builder(default)]
    pub docker_username: &'scope str,

    pub docker_password: Option<&'scope SecretValue>,

    /// The version of the executor in the image.
    #[builder(default)]
    pub kaniko_version: &'scope str,

    #[builder(default)]
    pub no_push: bool,

    /// Credentials from an assumed role. These replace the key
    /// and credential helper setup.
    pub role_credentials: Option<&'scope RegistryCredentials>,
}

impl EcrAuth<'_> {
    /// Builds the docker config and executor environment for pushing to ECR.
    ///
    /// # Errors
    /// Will error if a registry is needed but missing, or if the
    /// authorization token can't be decoded.
    pub fn login(&self) -> Result<RegistryLogin> {
        trace!("EcrAuth::login({self:?})");

        let mut login = RegistryLogin::default();

        if !self.docker_username.is_empty() {
            login.config.set_auth(
                REGISTRY_V1,
                self.docker_username,
                self.docker_password.unwrap_or(&SecretValue::default()),
            );
        }

        if let Some(credentials) = self.role_credentials {
            debug!("Using assumed role credentials for {}", credentials.registry);
            login.config.add(credentials)?;
            return Ok(login);
        }

        // Only setup auth when pushing or when credentials are given
        if self.no_push && self.access_key.is_empty() {
            debug!("Not pushing, skipping ECR login");
            return Ok(login);
        }

        if self.registry.is_empty() {
            bail!("Registry must be specified");
        }

        if let Some(token) = self.authorization_token.filter(|token| !token.is_empty()) {
            let credentials = decode_authorization_token(token.value(), self.registry)?;
            login.config.add(&credentials)?;
        }

        // Executors from 1.8.0 find ECR credentials without a helper
        if Version::is_below(self.kaniko_version, ECR_MIN_IMPLICIT_AUTH_VERSION) {
            debug!(
                "Executor version '{}' needs the {ECR_LOGIN_HELPER} credential helper",
                self.kaniko_version
            );
            login.config.set_cred_helper(REGISTRY_ECR_PUBLIC, ECR_LOGIN_HELPER);
            login.config.set_cred_helper(self.registry, ECR_LOGIN_HELPER);
        }

        // Without keys the executor falls back to the instance's IAM role
        if let Some(secret_key) = self
            .secret_key
            .filter(|key| !self.access_key.is_empty() && !key.is_empty())
        {
            login
                .envs
                .push((string!(AWS_ACCESS_KEY_ID), self.access_key.into()));
            login
                .envs
                .push((string!(AWS_SECRET_ACCESS_KEY), secret_key.clone()));
        }

        let region = aws_region(self.registry, self.region);
        if !region.is_empty() {
            login.envs.push((string!(AWS_REGION), region.into()));
        }

        Ok(login)
    }
}

/// The region to talk to, defaulting to the only region
/// ECR Public serves from.
#[must_use]
pub fn aws_region<'a>(registry: &str, region: &'a str) -> &'a str {
    if region.is_empty() && is_registry_public(registry) {
        ECR_PUBLIC_REGION
    } else {
        region
    }
}

/// Whether the registry is the public ECR gallery.
#[must_use]
pub fn is_registry_public(registry: &str) -> bool {
    registry.starts_with(REGISTRY_ECR_PUBLIC)
}

/// Turns an ECR authorization token into registry credentials.
///
/// The token is base64 encoded `user:password` and the proxy endpoint
/// is the registry URL.
///
/// # Errors
/// Will error if the token isn't base64 encoded `user:password`.
pub fn decode_authorization_token(
    token: &str,
    proxy_endpoint: &str,
) -> Result<RegistryCredentials> {
    let decoded = STANDARD
        .decode(token.trim())
        .into_diagnostic()
        .wrap_err("Failed to decode ECR authorization token")?;
    let decoded = String::from_utf8(decoded)
        .into_diagnostic()
        .wrap_err("ECR authorization token isn't valid UTF-8")?;

    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| miette!("ECR authorization token is missing the password"))?;

    Ok(RegistryCredentials::builder()
        .registry(proxy_endpoint.trim_start_matches("https://"))
        .username(username)
        .password(password)
        .build())
}

#[cfg(test)]
mod test {
    use kaniko_plugin_utils::{
        constants::{ECR_LOGIN_HELPER, REGISTRY_ECR_PUBLIC, REGISTRY_V1},
        docker_config::RegistryCredentials,
        secret::SecretValue,
    };
    use rstest::rstest;

    use super::{aws_region, decode_authorization_token, is_registry_public, EcrAuth};

    const REGISTRY: &str = "123456789012.dkr.ecr.us-east-1.amazonaws.com";

    fn env<'a>(envs: &'a [(String, SecretValue)], key: &str) -> Option<&'a str> {
        envs.iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.value())
    }

    #[rstest]
    #[case("1.7.0", true)]
    #[case("1.8.0-rc1", true)]
    #[case("", true)]
    #[case("1.9.1", false)]
    fn cred_helpers_for_old_executors(#[case] version: &str, #[case] helpers: bool) {
        let login = EcrAuth::builder()
            .registry(REGISTRY)
            .kaniko_version(version)
            .build()
            .login()
            .unwrap();

        assert_eq!(!login.config.cred_helpers().is_empty(), helpers);
        if helpers {
            assert_eq!(login.config.cred_helpers()[REGISTRY], ECR_LOGIN_HELPER);
            assert_eq!(login.config.cred_helpers()[REGISTRY_ECR_PUBLIC], ECR_LOGIN_HELPER);
        }
    }

    #[test]
    fn access_keys_go_to_executor_env() {
        let secret_key = SecretValue::from("secret");
        let login = EcrAuth::builder()
            .registry(REGISTRY)
            .region("eu-west-1")
            .access_key("AKIA")
            .secret_key(&secret_key)
            .kaniko_version("1.9.0")
            .build()
            .login()
            .unwrap();

        assert_eq!(env(&login.envs, "AWS_ACCESS_KEY_ID"), Some("AKIA"));
        assert_eq!(env(&login.envs, "AWS_SECRET_ACCESS_KEY"), Some("secret"));
        assert_eq!(env(&login.envs, "AWS_REGION"), Some("eu-west-1"));
    }

    #[test]
    fn public_registry_region() {
        let login = EcrAuth::builder()
            .registry("public.ecr.aws/abc123")
            .kaniko_version("1.9.0")
            .build()
            .login()
            .unwrap();

        assert_eq!(env(&login.envs, "AWS_REGION"), Some("us-east-1"));
    }

    #[test]
    fn docker_hub_credentials() {
        let password = SecretValue::from("hub-pass");
        let login = EcrAuth::builder()
            .docker_username("hub-user")
            .docker_password(&password)
            .no_push(true)
            .build()
            .login()
            .unwrap();

        assert!(login.config.auths().contains_key(REGISTRY_V1));
        assert!(login.config.cred_helpers().is_empty());
    }

    #[test]
    fn requires_registry_when_pushing() {
        assert!(EcrAuth::builder().build().login().is_err());
        assert!(EcrAuth::builder().no_push(true).build().login().is_ok());
        assert!(EcrAuth::builder()
            .no_push(true)
            .access_key("AKIA")
            .build()
            .login()
            .is_err());
    }

    #[test]
    fn authorization_token_login() {
        // base64 of "AWS:token-password"
        let token = SecretValue::from("QVdTOnRva2VuLXBhc3N3b3Jk");
        let login = EcrAuth::builder()
            .registry(REGISTRY)
            .authorization_token(&token)
            .kaniko_version("1.9.0")
            .build()
            .login()
            .unwrap();

        assert_eq!(
            login.config.auths()[REGISTRY].auth,
            "QVdTOnRva2VuLXBhc3N3b3Jk"
        );
    }

    #[test]
    fn decodes_token() {
        let creds = decode_authorization_token(
            "QVdTOnRva2VuLXBhc3N3b3Jk",
            "https://123456789012.dkr.ecr.us-east-1.amazonaws.com",
        )
        .unwrap();

        assert_eq!(creds.registry, REGISTRY);
        assert_eq!(creds.username, "AWS");
        assert_eq!(creds.password.value(), "token-password");
    }

    #[rstest]
    #[case("not base64!")]
    #[case("bm9jb2xvbg==")]
    fn rejects_bad_tokens(#[case] token: &str) {
        assert!(decode_authorization_token(token, REGISTRY).is_err());
    }

    #[rstest]
    #[case("public.ecr.aws/abc123", true)]
    #[case(REGISTRY, false)]
    fn public_registry(#[case] registry: &str, #[case] expected: bool) {
        assert_eq!(is_registry_public(registry), expected);
    }

    #[test]
    fn assumed_role_replaces_keys() {
        let secret_key = SecretValue::from("secret");
        let credentials = RegistryCredentials::builder()
            .registry(REGISTRY)
            .username("AWS")
            .password("role-password")
            .build();
        let login = EcrAuth::builder()
            .registry(REGISTRY)
            .access_key("AKIA")
            .secret_key(&secret_key)
            .no_push(true)
            .role_credentials(&credentials)
            .build()
            .login()
            .unwrap();

        // base64 of "AWS:role-password"
        assert_eq!(login.config.auths()[REGISTRY].auth, "QVdTOnJvbGUtcGFzc3dvcmQ=");
        assert!(login.config.cred_helpers().is_empty());
        assert!(login.envs.is_empty());
    }

    #[rstest]
    #[case("public.ecr.aws/abc123", "", "us-east-1")]
    #[case("public.ecr.aws/abc123", "eu-west-1", "eu-west-1")]
    #[case(REGISTRY, "", "")]
    fn aws_region_cases(#[case] registry: &str, #[case] region: &str, #[case] expected: &str) {
        assert_eq!(aws_region(registry, region), expected);
    }
}
