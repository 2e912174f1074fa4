// Paths
pub const DOCKER_CONFIG_DIR: &str = "/kaniko/.docker";
pub const DOCKER_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_DIGEST_FILE: &str = "/kaniko/digest-file";
pub const DEFAULT_OUTPUT_DIGEST_FILE: &str = "/kaniko/.docker/digest-file";
pub const GCP_CREDENTIALS_PATH: &str = "/kaniko/config.json";
pub const KANIKO_EXECUTOR_PATH: &str = "/kaniko/executor";
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";
pub const DEFAULT_CONTEXT: &str = ".";

// Registries
pub const REGISTRY_V1: &str = "https://index.docker.io/v1/";
pub const REGISTRY_V2: &str = "https://index.docker.io/v2/";
pub const REGISTRY_HUB_V2: &str = "https://registry.hub.docker.com/v2/";
pub const REGISTRY_ECR_PUBLIC: &str = "public.ecr.aws";
pub const REGISTRY_GCR: &str = "gcr.io";

// Credential helpers
pub const ECR_LOGIN_HELPER: &str = "ecr-login";

// Tags
pub const LATEST_TAG: &str = "latest";
pub const TAG_REF_PREFIX: &str = "refs/tags/";
pub const HEAD_REF_PREFIX: &str = "refs/heads/";

// Plugin vars
pub const PLUGIN_ACCESS_KEY: &str = "PLUGIN_ACCESS_KEY";
pub const PLUGIN_ARTIFACT_FILE: &str = "PLUGIN_ARTIFACT_FILE";
pub const PLUGIN_ASSUME_ROLE: &str = "PLUGIN_ASSUME_ROLE";
pub const PLUGIN_AUTHORIZATION_TOKEN: &str = "PLUGIN_AUTHORIZATION_TOKEN";
pub const PLUGIN_AUTO_TAG: &str = "PLUGIN_AUTO_TAG";
pub const PLUGIN_AUTO_TAG_SUFFIX: &str = "PLUGIN_AUTO_TAG_SUFFIX";
pub const PLUGIN_AZURE_AUTHORITY_HOST: &str = "PLUGIN_AZURE_AUTHORITY_HOST";
pub const PLUGIN_BASE_IMAGE_PASSWORD: &str = "PLUGIN_BASE_IMAGE_PASSWORD";
pub const PLUGIN_BASE_IMAGE_REGISTRY: &str = "PLUGIN_BASE_IMAGE_REGISTRY";
pub const PLUGIN_BASE_IMAGE_USERNAME: &str = "PLUGIN_BASE_IMAGE_USERNAME";
pub const PLUGIN_BUILD_ARGS: &str = "PLUGIN_BUILD_ARGS";
pub const PLUGIN_BUILD_ARGS_FROM_ENV: &str = "PLUGIN_BUILD_ARGS_FROM_ENV";
pub const PLUGIN_BUILD_ARGS_NEW: &str = "PLUGIN_BUILD_ARGS_NEW";
pub const PLUGIN_CACHE_REPO: &str = "PLUGIN_CACHE_REPO";
pub const PLUGIN_CACHE_TTL: &str = "PLUGIN_CACHE_TTL";
pub const PLUGIN_CLEANUP: &str = "PLUGIN_CLEANUP";
pub const PLUGIN_CLIENT_ID: &str = "PLUGIN_CLIENT_ID";
pub const PLUGIN_CLIENT_SECRET: &str = "PLUGIN_CLIENT_SECRET";
pub const PLUGIN_CONTEXT: &str = "PLUGIN_CONTEXT";
pub const PLUGIN_CONTEXT_SUB_PATH: &str = "PLUGIN_CONTEXT_SUB_PATH";
pub const PLUGIN_CREATE_REPOSITORY: &str = "PLUGIN_CREATE_REPOSITORY";
pub const PLUGIN_CUSTOM_LABELS: &str = "PLUGIN_CUSTOM_LABELS";
pub const PLUGIN_DOCKERFILE: &str = "PLUGIN_DOCKERFILE";
pub const PLUGIN_ENABLE_CACHE: &str = "PLUGIN_ENABLE_CACHE";
pub const PLUGIN_ENV_FILE: &str = "PLUGIN_ENV_FILE";
pub const PLUGIN_EXPAND_TAG: &str = "PLUGIN_EXPAND_TAG";
pub const PLUGIN_EXTERNAL_ID: &str = "PLUGIN_EXTERNAL_ID";
pub const PLUGIN_IMAGE_NAME_WITH_DIGEST_FILE: &str = "PLUGIN_IMAGE_NAME_WITH_DIGEST_FILE";
pub const PLUGIN_INSECURE: &str = "PLUGIN_INSECURE";
pub const PLUGIN_INSECURE_PULL: &str = "PLUGIN_INSECURE_PULL";
pub const PLUGIN_JSON_KEY: &str = "PLUGIN_JSON_KEY";
pub const PLUGIN_LIFECYCLE_POLICY: &str = "PLUGIN_LIFECYCLE_POLICY";
pub const PLUGIN_LOG_DIR: &str = "PLUGIN_LOG_DIR";
pub const PLUGIN_MULTIPLE_BUILD_ARGS: &str = "PLUGIN_MULTIPLE_BUILD_ARGS";
pub const PLUGIN_NO_PUSH: &str = "PLUGIN_NO_PUSH";
pub const PLUGIN_OCI_LAYOUT_PATH: &str = "PLUGIN_OCI_LAYOUT_PATH";
pub const PLUGIN_OIDC_TOKEN_ID: &str = "PLUGIN_OIDC_TOKEN_ID";
pub const PLUGIN_PASSWORD: &str = "PLUGIN_PASSWORD";
pub const PLUGIN_PLATFORM: &str = "PLUGIN_PLATFORM";
pub const PLUGIN_POOL_ID: &str = "PLUGIN_POOL_ID";
pub const PLUGIN_PROJECT_NUMBER: &str = "PLUGIN_PROJECT_NUMBER";
pub const PLUGIN_PROVIDER_ID: &str = "PLUGIN_PROVIDER_ID";
pub const PLUGIN_PUSH_ONLY: &str = "PLUGIN_PUSH_ONLY";
pub const PLUGIN_PUSH_RETRY: &str = "PLUGIN_PUSH_RETRY";
pub const PLUGIN_REGION: &str = "PLUGIN_REGION";
pub const PLUGIN_REGISTRY: &str = "PLUGIN_REGISTRY";
pub const PLUGIN_REGISTRY_MIRRORS: &str = "PLUGIN_REGISTRY_MIRRORS";
pub const PLUGIN_REPO: &str = "PLUGIN_REPO";
pub const PLUGIN_REPOSITORY_POLICY: &str = "PLUGIN_REPOSITORY_POLICY";
pub const PLUGIN_REPRODUCIBLE: &str = "PLUGIN_REPRODUCIBLE";
pub const PLUGIN_SECRET_KEY: &str = "PLUGIN_SECRET_KEY";
pub const PLUGIN_SERVICE_ACCOUNT_EMAIL: &str = "PLUGIN_SERVICE_ACCOUNT_EMAIL";
pub const PLUGIN_SINGLE_SNAPSHOT: &str = "PLUGIN_SINGLE_SNAPSHOT";
pub const PLUGIN_SKIP_TLS_VERIFY: &str = "PLUGIN_SKIP_TLS_VERIFY";
pub const PLUGIN_SKIP_UNUSED_STAGES: &str = "PLUGIN_SKIP_UNUSED_STAGES";
pub const PLUGIN_SNAPSHOT_MODE: &str = "PLUGIN_SNAPSHOT_MODE";
pub const PLUGIN_SOURCE_TAR_PATH: &str = "PLUGIN_SOURCE_TAR_PATH";
pub const PLUGIN_SUBSCRIPTION_ID: &str = "PLUGIN_SUBSCRIPTION_ID";
pub const PLUGIN_TAGS: &str = "PLUGIN_TAGS";
pub const PLUGIN_TARGET: &str = "PLUGIN_TARGET";
pub const PLUGIN_TAR_PATH: &str = "PLUGIN_TAR_PATH";
pub const PLUGIN_TENANT_ID: &str = "PLUGIN_TENANT_ID";
pub const PLUGIN_USERNAME: &str = "PLUGIN_USERNAME";
pub const PLUGIN_VERBOSITY: &str = "PLUGIN_VERBOSITY";

// Drone vars
pub const DRONE_COMMIT_REF: &str = "DRONE_COMMIT_REF";
pub const DRONE_OUTPUT: &str = "DRONE_OUTPUT";
pub const DRONE_REPO_BRANCH: &str = "DRONE_REPO_BRANCH";
pub const DRONE_WORKSPACE: &str = "DRONE_WORKSPACE";

// Executor vars
pub const KANIKO_EXECUTOR: &str = "KANIKO_EXECUTOR";
pub const KANIKO_VERSION: &str = "KANIKO_VERSION";

// Cloud vars handed to the executor
pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_REGION: &str = "AWS_REGION";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

// Azure
pub const ACR_USERNAME: &str = "00000000-0000-0000-0000-000000000000";
pub const AZURE_DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const AZURE_DEFAULT_RESOURCE: &str = "https://management.azure.com/";
pub const AZURE_IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
pub const AZURE_PORTAL_REGISTRY_URL: &str =
    "https://portal.azure.com/#view/Microsoft_Azure_ContainerRegistries/TagMetadataBlade/registryId/";
pub const AZURE_MAX_PAGE_COUNT: usize = 1000;

// GCP
pub const GCP_STS_TOKEN_URL: &str = "https://sts.googleapis.com/v1/token";
pub const GCP_ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";
pub const GCP_IAM_CREDENTIALS_URL: &str =
    "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts";

// Misc
pub const DEFAULT_HOME_DIR: &str = "/home/harness";
pub const ECR_MIN_IMPLICIT_AUTH_VERSION: &str = "1.8.0";
pub const ECR_ROLE_SESSION_NAME: &str = "kaniko-plugin";
