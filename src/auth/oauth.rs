use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context, Result};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::OAuthConfig;

/// Verifies identity-provider ID tokens against the issuer's published JWKS
#[derive(Clone)]
pub struct JwksVerifier {
    issuer: String,
    audience: String,
    jwks_uri: String,
    client: Client,
    keys: Arc<RwLock<KeyCache>>,
    cache_ttl: Duration,
}

#[derive(Default)]
struct KeyCache {
    keys: HashMap<String, Arc<DecodingKey>>,
    fetched_at: Option<Instant>,
}

impl KeyCache {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.is_none_or(|at| at.elapsed() > ttl)
    }
}

impl JwksVerifier {
    pub async fn from_config(config: &OAuthConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("qrgen-oauth/0.1.0")
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client for token verification")?;

        let jwks_uri = resolve_jwks_uri(config, &client).await?;
        let verifier = Self {
            issuer: config.issuer_url.trim_end_matches('/').to_string(),
            audience: config.audience.clone(),
            jwks_uri,
            client,
            keys: Arc::new(RwLock::new(KeyCache::default())),
            cache_ttl: Duration::from_secs(config.jwks_cache_ttl_secs.max(60)),
        };

        if let Err(e) = verifier.refresh_keys().await {
            warn!("Failed to prime JWKS cache, will retry on first request: {e:#}");
        }

        Ok(verifier)
    }

    /// Verify `token` and return its claims
    pub async fn verify(&self, token: &str) -> Result<Value> {
        let header = decode_header(token).context("failed to parse token header")?;
        let kid = header
            .kid
            .ok_or_else(|| anyhow!("token header missing 'kid'"))?;

        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;

        let claims = decode::<Value>(token, key.as_ref(), &validation)
            .context("token failed signature or structural validation")?
            .claims;

        let issuer = claims
            .get("iss")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("token missing 'iss' claim"))?;
        if !issuer_matches(issuer, &self.issuer) {
            bail!("token issuer '{issuer}' does not match expected issuer");
        }

        if !audience_matches(claims.get("aud"), &self.audience) {
            bail!("token audience does not include expected value");
        }

        Ok(claims)
    }

    async fn decoding_key(&self, kid: &str) -> Result<Arc<DecodingKey>> {
        {
            let cache = self.keys.read().await;
            if !cache.is_stale(self.cache_ttl) {
                if let Some(key) = cache.keys.get(kid) {
                    return Ok(Arc::clone(key));
                }
            }
        }

        // Stale cache or unknown kid (key rotation): refetch once
        debug!("Refreshing JWKS cache for key id {kid}");
        self.refresh_keys().await?;

        self.keys
            .read()
            .await
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| anyhow!("no JWKS entry found for key id '{kid}'"))
    }

    async fn refresh_keys(&self) -> Result<()> {
        let jwks: JwkSet = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .context("failed to request JWKS")?
            .error_for_status()
            .context("JWKS endpoint returned an error status")?
            .json()
            .await
            .context("failed to parse JWKS response")?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            let Some(kid) = jwk.kid.clone() else {
                warn!("Skipping JWKS entry without 'kid'");
                continue;
            };
            match jwk.decoding_key() {
                Ok(Some(key)) => {
                    keys.insert(kid, Arc::new(key));
                }
                Ok(None) => warn!("Skipping unsupported JWKS key type: {}", jwk.kty),
                Err(e) => warn!("Skipping unusable JWKS entry {kid}: {e:#}"),
            }
        }

        if keys.is_empty() {
            bail!("JWKS response did not contain any usable keys");
        }

        let mut cache = self.keys.write().await;
        cache.keys = keys;
        cache.fetched_at = Some(Instant::now());

        Ok(())
    }
}

/// Google issues both `accounts.google.com` and `https://accounts.google.com`
fn issuer_matches(claimed: &str, expected: &str) -> bool {
    let claimed = claimed.trim_end_matches('/');
    claimed == expected
        || expected
            .strip_prefix("https://")
            .is_some_and(|bare| claimed == bare)
}

fn audience_matches(aud_claim: Option<&Value>, expected: &str) -> bool {
    match aud_claim {
        Some(Value::String(aud)) => aud == expected,
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(Value::as_str)
            .any(|entry| entry == expected),
        _ => false,
    }
}

/// The `sub` claim identifies the owner of QR records
pub fn subject(claims: &Value) -> Option<&str> {
    claims
        .get("sub")
        .and_then(Value::as_str)
        .filter(|sub| !sub.is_empty())
}

async fn resolve_jwks_uri(config: &OAuthConfig, client: &Client) -> Result<String> {
    if let Some(url) = &config.jwks_url {
        return Ok(url.clone());
    }

    let issuer = config.issuer_url.trim_end_matches('/');
    let discovery_url = format!("{issuer}/.well-known/openid-configuration");
    let metadata: OpenIdProviderMetadata = client
        .get(&discovery_url)
        .send()
        .await
        .context("failed to request OpenID provider metadata")?
        .error_for_status()
        .context("OpenID provider metadata endpoint returned an error status")?
        .json()
        .await
        .context("failed to parse OpenID provider metadata")?;

    metadata
        .jwks_uri
        .ok_or_else(|| anyhow!("OpenID provider metadata did not include 'jwks_uri'"))
}

#[derive(Debug, Deserialize)]
struct OpenIdProviderMetadata {
    jwks_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    #[serde(default)]
    kty: String,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

impl Jwk {
    /// RSA keys only; identity providers sign ID tokens with RS256
    fn decoding_key(&self) -> Result<Option<DecodingKey>> {
        if self.kty != "RSA" {
            return Ok(None);
        }
        if let Some(alg) = self.alg.as_deref() {
            if alg.parse::<Algorithm>().is_err() {
                bail!("unknown algorithm '{alg}'");
            }
        }
        let n = self
            .n
            .as_deref()
            .ok_or_else(|| anyhow!("RSA key missing modulus"))?;
        let e = self
            .e
            .as_deref()
            .ok_or_else(|| anyhow!("RSA key missing exponent"))?;
        DecodingKey::from_rsa_components(n, e)
            .map(Some)
            .context("failed to build RSA decoding key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_matching_handles_strings_and_arrays() {
        assert!(audience_matches(Some(&Value::String("abc".into())), "abc"));
        assert!(!audience_matches(Some(&Value::String("abc".into())), "def"));

        let array = Value::Array(vec![
            Value::String("def".into()),
            Value::String("ghi".into()),
        ]);
        assert!(audience_matches(Some(&array), "def"));
        assert!(!audience_matches(Some(&array), "abc"));

        assert!(!audience_matches(None, "abc"));
    }

    #[test]
    fn issuer_matching_accepts_bare_google_form() {
        assert!(issuer_matches(
            "https://accounts.google.com",
            "https://accounts.google.com"
        ));
        assert!(issuer_matches("accounts.google.com", "https://accounts.google.com"));
        assert!(!issuer_matches("https://evil.example", "https://accounts.google.com"));
    }

    #[test]
    fn subject_requires_a_non_empty_string() {
        let claims = serde_json::json!({ "sub": "10987654321" });
        assert_eq!(subject(&claims), Some("10987654321"));
        assert_eq!(subject(&serde_json::json!({ "sub": "" })), None);
        assert_eq!(subject(&serde_json::json!({ "sub": 42 })), None);
        assert_eq!(subject(&serde_json::json!({})), None);
    }

    #[test]
    fn non_rsa_keys_are_skipped() {
        let jwk: Jwk = serde_json::from_value(serde_json::json!({
            "kid": "k1",
            "kty": "EC",
        }))
        .unwrap();
        assert!(jwk.decoding_key().unwrap().is_none());

        let jwk: Jwk = serde_json::from_value(serde_json::json!({
            "kid": "k2",
            "kty": "RSA",
        }))
        .unwrap();
        assert!(jwk.decoding_key().is_err());
    }
}
