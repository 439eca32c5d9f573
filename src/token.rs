// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Lumigo token resolution and validation.

use std::sync::LazyLock;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use regex::Regex;
use thiserror::Error;

use crate::error::OperatorError;
use crate::types::SecretReference;

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^t_[[:alnum:]]{21}$").expect("valid token pattern"));

/// Namespaced secret reads
#[async_trait]
pub trait SecretLookup: Send + Sync {
    /// `Ok(None)` when the secret does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> crate::error::Result<Option<Secret>>;
}

/// A syntactically valid Lumigo token
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(***)")
    }
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("invalid Lumigo token secret reference: cannot retrieve secret '{namespace}/{name}'")]
    SecretNotFound { namespace: String, name: String },

    #[error("invalid Lumigo token secret reference: the secret '{namespace}/{name}' does not have the key '{key}'")]
    KeyMissing {
        namespace: String,
        name: String,
        key: String,
    },

    #[error(
        "invalid Lumigo token secret reference: the value of the field '{key}' of the secret '{namespace}/{name}' \
         does not match the expected structure of Lumigo tokens: it should be `t_` followed by of 21 alphanumeric \
         characters; see https://docs.lumigo.io/docs/lumigo-tokens for instructions on how to retrieve your Lumigo token"
    )]
    MalformedToken {
        namespace: String,
        name: String,
        key: String,
    },

    /// API failures other than not-found; retried by the caller, never surfaced as a condition
    #[error(transparent)]
    Transient(#[from] OperatorError),
}

/// Resolve the referenced secret and validate the token it holds.
pub async fn validate<L>(
    lookup: &L,
    namespace: &str,
    secret_ref: &SecretReference,
) -> Result<Token, TokenError>
where
    L: SecretLookup + ?Sized,
{
    let secret = lookup.get_secret(namespace, &secret_ref.name).await?;
    validate_secret(namespace, secret_ref, secret.as_ref())
}

/// Validate a token against an already-fetched secret (`None` when it does not exist).
pub fn validate_secret(
    namespace: &str,
    secret_ref: &SecretReference,
    secret: Option<&Secret>,
) -> Result<Token, TokenError> {
    let Some(secret) = secret else {
        return Err(TokenError::SecretNotFound {
            namespace: namespace.to_string(),
            name: secret_ref.name.clone(),
        });
    };

    let from_data = secret
        .data
        .as_ref()
        .and_then(|d| d.get(&secret_ref.key))
        .map(|v| String::from_utf8_lossy(&v.0).into_owned());
    let from_string_data = secret
        .string_data
        .as_ref()
        .and_then(|d| d.get(&secret_ref.key))
        .cloned();

    let Some(value) = from_string_data.or(from_data) else {
        return Err(TokenError::KeyMissing {
            namespace: namespace.to_string(),
            name: secret_ref.name.clone(),
            key: secret_ref.key.clone(),
        });
    };

    if !TOKEN_PATTERN.is_match(&value) {
        return Err(TokenError::MalformedToken {
            namespace: namespace.to_string(),
            name: secret_ref.name.clone(),
            key: secret_ref.key.clone(),
        });
    }

    Ok(Token(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    const VALID_TOKEN: &str = "t_1234567890123456789AB";

    fn secret_ref() -> SecretReference {
        SecretReference {
            name: "lumigo-credentials".to_string(),
            key: "token".to_string(),
        }
    }

    fn make_secret(key: &str, value: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("lumigo-credentials".to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                key.to_string(),
                ByteString(value.as_bytes().to_vec()),
            )])),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_secret_message() {
        let err = validate_secret("ns", &secret_ref(), None).unwrap_err();

        assert_eq!(
            err.to_string(),
            "invalid Lumigo token secret reference: cannot retrieve secret 'ns/lumigo-credentials'"
        );
        assert!(matches!(err, TokenError::SecretNotFound { .. }));
    }

    #[test]
    fn test_wrong_key_message() {
        let secret = make_secret("NOTTOKEN", VALID_TOKEN);
        let err = validate_secret("ns", &secret_ref(), Some(&secret)).unwrap_err();

        assert_eq!(
            err.to_string(),
            "invalid Lumigo token secret reference: the secret 'ns/lumigo-credentials' does not have the key 'token'"
        );
    }

    #[test]
    fn test_malformed_token_message() {
        let secret = make_secret("token", "abcd");
        let err = validate_secret("ns", &secret_ref(), Some(&secret)).unwrap_err();

        assert_eq!(
            err.to_string(),
            "invalid Lumigo token secret reference: the value of the field 'token' of the secret 'ns/lumigo-credentials' \
             does not match the expected structure of Lumigo tokens: it should be `t_` followed by of 21 alphanumeric \
             characters; see https://docs.lumigo.io/docs/lumigo-tokens for instructions on how to retrieve your Lumigo token"
        );
    }

    #[test]
    fn test_valid_token() {
        let secret = make_secret("token", VALID_TOKEN);
        let token = validate_secret("ns", &secret_ref(), Some(&secret)).unwrap();

        assert_eq!(token.as_str(), VALID_TOKEN);
        assert_eq!(format!("{:?}", token), "Token(***)");
    }

    #[test]
    fn test_token_from_string_data() {
        let secret = Secret {
            string_data: Some(BTreeMap::from([(
                "token".to_string(),
                VALID_TOKEN.to_string(),
            )])),
            ..Default::default()
        };

        assert!(validate_secret("ns", &secret_ref(), Some(&secret)).is_ok());
    }

    #[test]
    fn test_token_pattern_edges() {
        for bad in [
            "t_1234567890123456789A",
            "t_1234567890123456789ABC",
            "x_1234567890123456789AB",
            "t_12345678901234567-9AB",
            " t_1234567890123456789AB",
        ] {
            let secret = make_secret("token", bad);
            assert!(
                matches!(
                    validate_secret("ns", &secret_ref(), Some(&secret)),
                    Err(TokenError::MalformedToken { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    struct FailingLookup;

    #[async_trait]
    impl SecretLookup for FailingLookup {
        async fn get_secret(&self, _: &str, _: &str) -> crate::error::Result<Option<Secret>> {
            Err(OperatorError::Conflict("api unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_api_failures_are_transient() {
        let err = validate(&FailingLookup, "ns", &secret_ref()).await.unwrap_err();

        assert!(matches!(err, TokenError::Transient(_)));
    }
}
