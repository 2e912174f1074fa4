use serde::Deserialize;
use zeroize::Zeroizing;

/// A credential value that is wiped from memory on drop
/// and never printed by `Debug` or `Display`.
#[derive(Default, Clone, PartialEq, Eq, Deserialize)]
pub struct SecretValue(Zeroizing<String>);

macro_rules! impl_secret_value {
    ($($type:ty),*) => {
        $(
            impl From<$type> for SecretValue {
                fn from(value: $type) -> Self {
                    Self(String::from(value.trim()).into())
                }
            }
        )*
    };
}

impl_secret_value!(String, &String, &str);

impl SecretValue {
    /// Get the value of the secret.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}
