// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! IAM exchange [Credentials] type.
//!
//! A service account is an account for an application or compute workload
//! instead of an individual end user. Its long-lived RSA key never travels
//! over the wire: the client signs a short, time-bounded assertion with it
//! and exchanges the assertion at the IAM token service for an opaque bearer
//! token. Tokens are cached and refreshed at the midpoint of their granted
//! lifetime, so callers can request one per outbound RPC without paying for
//! a network round trip each time.
//!
//! Service account keys carry the cryptographic material required to
//! impersonate the account. Treat them as unencrypted passwords; do not
//! store them where unauthorized persons or programs may read them.
//!
//! Example usage:
//!
//! ```
//! # use cloud_iam_auth::credentials::iam::Builder;
//! # use cloud_iam_auth::errors::Error;
//! # tokio_test::block_on(async {
//! let credentials = Builder::default()
//!     .with_service_account_key_file("~/.config/cloud/service_account.json")
//!     .with_source_info("example")
//!     .build()?;
//! let token = credentials.token().await?;
//! println!("token: {}", token.token);
//! # Ok::<(), Error>(())
//! # });
//! ```

mod jws;

use crate::Result;
use crate::clock::{Clock, SystemClock};
use crate::constants::{DEFAULT_AUDIENCE, DEFAULT_ENDPOINT, DEFAULT_TOKEN_TTL};
use crate::credentials::Credentials;
use crate::credentials::dynamic::CredentialsProvider;
use crate::errors::Error;
use crate::headers_util::build_bearer_headers;
use crate::token::{IssuedToken, Token, TokenProvider};
use crate::token_cache::TokenCache;
use crate::transport::{ChannelSecurity, HttpTransport, TokenExchange, parse_ca_bundle};
use http::header::{HeaderName, HeaderValue};
use jws::AssertionSigner;
use rsa::RsaPrivateKey;
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;

/// A service account key, as issued by the IAM service.
///
/// This type is typically created by deserializing the downloaded JSON key
/// data, for example when the key is obtained from a secret manager.
#[derive(Clone, serde::Deserialize)]
pub struct ServiceAccountKey {
    /// ID of the key pair, sent as the `kid` header of the assertion.
    pub id: String,
    /// The service account this key belongs to, sent as the `iss` claim.
    pub service_account_id: String,
    /// The PEM-encoded RSA private key (PKCS#1 or PKCS#8).
    pub private_key: String,
    /// Optional token service endpoint. When present it overrides the
    /// endpoint configured on the [Builder].
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl ServiceAccountKey {
    /// Parses and validates a service account key from its JSON form.
    ///
    /// All of `id`, `service_account_id` and `private_key` must be present
    /// and non-empty; nothing is applied to a builder before the whole
    /// payload validates.
    pub fn from_json(data: &str) -> Result<Self> {
        let key =
            serde_json::from_str::<ServiceAccountKey>(data).map_err(Error::invalid_service_account)?;
        for (field, value) in [
            ("id", &key.id),
            ("service_account_id", &key.service_account_id),
            ("private_key", &key.private_key),
        ] {
            if value.is_empty() {
                return Err(Error::invalid_service_account(format!(
                    "missing required field `{field}`"
                )));
            }
        }
        Ok(key)
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("id", &self.id)
            .field("service_account_id", &self.service_account_id)
            .field("private_key", &"[censored]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

enum KeySource {
    None,
    Key(RsaPrivateKey),
    KeyFile(PathBuf),
    ServiceAccount(ServiceAccountKey),
    ServiceAccountJson(String),
    ServiceAccountFile(PathBuf),
}

enum CaSource {
    Pem(Vec<u8>),
    File(PathBuf),
}

/// A builder for IAM exchange [Credentials].
///
/// The builder starts from working defaults (production endpoint and
/// audience, one hour assertion lifetime, system trust roots) and validates
/// everything in [build](Builder::build); nothing is applied to a client
/// halfway.
pub struct Builder {
    endpoint: String,
    audience: String,
    token_ttl: std::time::Duration,
    key_source: KeySource,
    key_id: Option<String>,
    issuer: Option<String>,
    ca_certificates: Option<CaSource>,
    insecure_skip_verify: bool,
    plaintext: bool,
    fallback: Option<Credentials>,
    source_info: Option<String>,
    clock: Arc<dyn Clock>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            token_ttl: DEFAULT_TOKEN_TTL,
            key_source: KeySource::None,
            key_id: None,
            issuer: None,
            ca_certificates: None,
            insecure_skip_verify: false,
            plaintext: false,
            fallback: None,
            source_info: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl Builder {
    /// Sets the token service endpoint.
    ///
    /// A service account key with its own `endpoint` field overrides this
    /// value.
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the `aud` claim of the assertion.
    pub fn with_audience<S: Into<String>>(mut self, audience: S) -> Self {
        self.audience = audience.into();
        self
    }

    /// Sets the requested assertion lifetime.
    ///
    /// This bounds the assertion, not the issued token; the token service
    /// decides the token lifetime on its own.
    pub fn with_token_ttl(mut self, token_ttl: std::time::Duration) -> Self {
        self.token_ttl = token_ttl;
        self
    }

    /// Sets the key id sent as the `kid` header of the assertion.
    ///
    /// Takes precedence over the `id` of a service account key.
    pub fn with_key_id<S: Into<String>>(mut self, key_id: S) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Sets the `iss` claim of the assertion.
    ///
    /// Takes precedence over the `service_account_id` of a service account
    /// key.
    pub fn with_issuer<S: Into<String>>(mut self, issuer: S) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Signs assertions with the given private key. The most recent key
    /// source wins.
    pub fn with_private_key(mut self, key: RsaPrivateKey) -> Self {
        self.key_source = KeySource::Key(key);
        self
    }

    /// Reads the private key from a PEM file (PKCS#1 or PKCS#8). A leading
    /// `~/` expands to the home directory.
    pub fn with_private_key_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.key_source = KeySource::KeyFile(path.into());
        self
    }

    /// Takes the key, key id, issuer, and possibly the endpoint from a
    /// parsed service account key.
    pub fn with_service_account_key(mut self, key: ServiceAccountKey) -> Self {
        self.key_source = KeySource::ServiceAccount(key);
        self
    }

    /// Like [with_service_account_key](Builder::with_service_account_key),
    /// from the JSON key data.
    pub fn with_service_account_key_json<S: Into<String>>(mut self, json: S) -> Self {
        self.key_source = KeySource::ServiceAccountJson(json.into());
        self
    }

    /// Like [with_service_account_key](Builder::with_service_account_key),
    /// from a JSON key file. A leading `~/` expands to the home directory.
    pub fn with_service_account_key_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.key_source = KeySource::ServiceAccountFile(path.into());
        self
    }

    /// Verifies the token service against the given PEM certificate bundle
    /// instead of the system trust store.
    pub fn with_ca_certificates_pem<B: Into<Vec<u8>>>(mut self, pem: B) -> Self {
        self.ca_certificates = Some(CaSource::Pem(pem.into()));
        self
    }

    /// Like [with_ca_certificates_pem](Builder::with_ca_certificates_pem),
    /// from a file. A leading `~/` expands to the home directory.
    pub fn with_ca_certificates_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.ca_certificates = Some(CaSource::File(path.into()));
        self
    }

    /// Accept any TLS certificate presented by the token service and any
    /// host name in that certificate. When set, CA certificates are ignored.
    ///
    /// This should be used only for testing.
    pub fn with_insecure_skip_verify(mut self) -> Self {
        self.insecure_skip_verify = true;
        self
    }

    /// Talk to the token service without TLS, for `http://` endpoints.
    ///
    /// This should be used only for testing.
    pub fn with_plaintext(mut self) -> Self {
        self.plaintext = true;
        self
    }

    /// Installs fallback credentials, used wholesale in place of the IAM
    /// exchange when this builder fails to validate.
    pub fn with_fallback_credentials(mut self, fallback: Credentials) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Attaches a diagnostic label, included in the debug representation of
    /// the credentials.
    pub fn with_source_info<S: Into<String>>(mut self, source_info: S) -> Self {
        self.source_info = Some(source_info.into());
        self
    }

    /// Replaces the time source used for expiry checks and assertion
    /// timestamps. Tests use this to supply a simulated clock.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Returns a [Credentials] instance with the configured settings.
    ///
    /// # Errors
    ///
    /// Validation or key-material failures surface here, before any token is
    /// requested. With fallback credentials installed the failure is
    /// remembered instead, and the fallback serves every token request;
    /// should the fallback itself fail, its error wraps the original one.
    pub fn build(mut self) -> Result<Credentials> {
        let fallback = self.fallback.take();
        match self.resolve() {
            Ok(config) => Ok(config.into_credentials()),
            Err(e) => match fallback {
                Some(fallback) => Ok(Credentials {
                    inner: Arc::new(FallbackCredentials {
                        config_error: Arc::new(e),
                        inner: fallback,
                    }),
                }),
                None => Err(e),
            },
        }
    }

    fn resolve(self) -> Result<ResolvedConfig> {
        let resolved_key = match self.key_source {
            KeySource::None => ResolvedKey::default(),
            KeySource::Key(key) => ResolvedKey {
                key: Some(key),
                ..ResolvedKey::default()
            },
            KeySource::KeyFile(path) => {
                let path = expand_home(path);
                let pem = std::fs::read_to_string(&path).map_err(|e| {
                    Error::configuration(format!(
                        "cannot read private key file `{}`: {e}",
                        path.display()
                    ))
                })?;
                ResolvedKey {
                    key: Some(jws::parse_private_key(&pem)?),
                    ..ResolvedKey::default()
                }
            }
            KeySource::ServiceAccount(key) => ResolvedKey::from_service_account(key)?,
            KeySource::ServiceAccountJson(json) => {
                ResolvedKey::from_service_account(ServiceAccountKey::from_json(&json)?)?
            }
            KeySource::ServiceAccountFile(path) => {
                let path = expand_home(path);
                let data = std::fs::read_to_string(&path).map_err(|e| {
                    Error::configuration(format!(
                        "cannot read service account key file `{}`: {e}",
                        path.display()
                    ))
                })?;
                ResolvedKey::from_service_account(ServiceAccountKey::from_json(&data)?)?
            }
        };

        let endpoint = resolved_key.endpoint.unwrap_or(self.endpoint);
        if endpoint.is_empty() {
            return Err(Error::configuration("endpoint must not be empty"));
        }

        let signer = match resolved_key.key {
            None => None,
            Some(key) => {
                let key_id = self
                    .key_id
                    .or(resolved_key.key_id)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| Error::configuration("a key id is required with a private key"))?;
                let issuer = self
                    .issuer
                    .or(resolved_key.issuer)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| Error::configuration("an issuer is required with a private key"))?;
                Some(AssertionSigner::new(key, key_id, issuer))
            }
        };

        let channel = if self.plaintext {
            ChannelSecurity::Plaintext
        } else if self.insecure_skip_verify {
            ChannelSecurity::SkipVerify
        } else {
            match self.ca_certificates {
                None => ChannelSecurity::SystemRoots,
                Some(CaSource::Pem(pem)) => ChannelSecurity::CertPool(parse_ca_bundle(&pem)?),
                Some(CaSource::File(path)) => {
                    let path = expand_home(path);
                    let pem = std::fs::read(&path).map_err(|e| {
                        Error::configuration(format!(
                            "cannot read CA certificate file `{}`: {e}",
                            path.display()
                        ))
                    })?;
                    ChannelSecurity::CertPool(parse_ca_bundle(&pem)?)
                }
            }
        };

        Ok(ResolvedConfig {
            endpoint,
            audience: self.audience,
            token_ttl: self.token_ttl,
            signer,
            channel,
            source_info: self.source_info,
            clock: self.clock,
        })
    }
}

// The validated, immutable view of a builder. Frozen before the first token
// request.
struct ResolvedConfig {
    endpoint: String,
    audience: String,
    token_ttl: std::time::Duration,
    signer: Option<AssertionSigner>,
    channel: ChannelSecurity,
    source_info: Option<String>,
    clock: Arc<dyn Clock>,
}

impl ResolvedConfig {
    fn into_credentials(self) -> Credentials {
        let transport = HttpTransport::new(self.endpoint, self.channel);
        let provider = IamTokenProvider {
            signer: self.signer,
            audience: self.audience,
            token_ttl: self.token_ttl,
            transport,
        };
        Credentials {
            inner: Arc::new(IamCredentials {
                cache: TokenCache::new(provider, self.clock),
                source_info: self.source_info,
            }),
        }
    }
}

#[derive(Default)]
struct ResolvedKey {
    key: Option<RsaPrivateKey>,
    key_id: Option<String>,
    issuer: Option<String>,
    endpoint: Option<String>,
}

impl ResolvedKey {
    fn from_service_account(sa: ServiceAccountKey) -> Result<Self> {
        let key = jws::parse_private_key(&sa.private_key)?;
        Ok(Self {
            key: Some(key),
            key_id: Some(sa.id),
            issuer: Some(sa.service_account_id),
            endpoint: sa.endpoint,
        })
    }
}

fn expand_home(path: PathBuf) -> PathBuf {
    let home_relative = path
        .to_str()
        .and_then(|p| p.strip_prefix("~/"))
        .map(str::to_string);
    match (home_relative, std::env::var("HOME")) {
        (Some(rest), Ok(home)) => PathBuf::from(home).join(rest),
        _ => path,
    }
}

#[derive(Debug)]
struct IamTokenProvider<T>
where
    T: TokenExchange,
{
    signer: Option<AssertionSigner>,
    audience: String,
    token_ttl: std::time::Duration,
    transport: T,
}

#[async_trait::async_trait]
impl<T> TokenProvider for IamTokenProvider<T>
where
    T: TokenExchange,
{
    async fn fetch(&self, now: OffsetDateTime) -> Result<IssuedToken> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| Error::signing("no private key configured"))?;
        let assertion = signer.sign(&self.audience, self.token_ttl, now)?;
        self.transport.create_token(&assertion).await
    }
}

struct IamCredentials<T>
where
    T: TokenExchange,
{
    cache: TokenCache<IamTokenProvider<T>>,
    source_info: Option<String>,
}

impl<T> std::fmt::Debug for IamCredentials<T>
where
    T: TokenExchange,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("IamCredentials");
        if let Some(source_info) = &self.source_info {
            s.field("source_info", source_info);
        }
        s.field("cache", &self.cache).finish()
    }
}

#[async_trait::async_trait]
impl<T> CredentialsProvider for IamCredentials<T>
where
    T: TokenExchange + 'static,
{
    async fn token(&self) -> Result<Token> {
        self.cache.token().await
    }

    async fn headers(&self) -> Result<Vec<(HeaderName, HeaderValue)>> {
        build_bearer_headers(&self.token().await?)
    }
}

// Serves every request from the user-supplied fallback, remembering why the
// primary credentials never came to be.
#[derive(Debug)]
struct FallbackCredentials {
    config_error: Arc<Error>,
    inner: Credentials,
}

#[async_trait::async_trait]
impl CredentialsProvider for FallbackCredentials {
    async fn token(&self) -> Result<Token> {
        self.inner
            .token()
            .await
            .map_err(|e| Error::fallback(&self.config_error, e))
    }

    async fn headers(&self) -> Result<Vec<(HeaderName, HeaderValue)>> {
        self.inner
            .headers()
            .await
            .map_err(|e| Error::fallback(&self.config_error, e))
    }
}
