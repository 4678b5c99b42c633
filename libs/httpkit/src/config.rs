use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::logging::LogConfig;

/// Connect timeout applied when [`ClientOption::connect_timeout`] is zero.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(300);

/// Redirect passes followed before the client gives up.
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Prefix of environment variables read by [`HttpkitConfig::load`].
pub const ENV_PREFIX: &str = "HTTPKIT_";

/// Exponential backoff between transient retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExponentialBackoff {
    /// Initial backoff duration (default: 100ms)
    #[serde(with = "humantime_duration")]
    pub initial: Duration,

    /// Maximum backoff duration (default: 10s)
    #[serde(with = "humantime_duration")]
    pub max: Duration,

    /// Backoff multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,

    /// Add a random 0-25% to each delay (default: true)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Default::default()
        }
    }

    /// Create fast backoff for testing (1ms initial, 10ms max, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(10),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

/// General client behaviour.
///
/// Zero means "transport default" for the timeouts and "unlimited" for the
/// rate caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientOption {
    /// Extra attempts after a timeout or refused connection (default: 0)
    pub retry_count: u32,

    /// Limit for establishing the connection, TLS included (default: 0 = 300s)
    #[serde(with = "humantime_duration")]
    pub connect_timeout: Duration,

    /// Limit for one whole exchange (default: 0 = none)
    #[serde(with = "humantime_duration")]
    pub transfer_timeout: Duration,

    /// Upload cap in bytes per second (default: 0 = unlimited)
    pub max_upload_speed: u64,

    /// Download cap in bytes per second (default: 0 = unlimited)
    pub max_download_speed: u64,

    /// Re-issue the call against the target of a 301 (default: false)
    pub auto_redirect: bool,

    /// Redirect passes per call (default: 5)
    pub max_redirects: u32,

    /// Log every exchange at debug level (default: false)
    pub verbose: bool,

    /// Delay between retries; `None` retries immediately (default)
    pub retry_backoff: Option<ExponentialBackoff>,
}

impl Default for ClientOption {
    fn default() -> Self {
        Self {
            retry_count: 0,
            connect_timeout: Duration::ZERO,
            transfer_timeout: Duration::ZERO,
            max_upload_speed: 0,
            max_download_speed: 0,
            auto_redirect: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            verbose: false,
            retry_backoff: None,
        }
    }
}

impl ClientOption {
    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_speed_limits(mut self, max_upload: u64, max_download: u64) -> Self {
        self.max_upload_speed = max_upload;
        self.max_download_speed = max_download;
        self
    }

    #[must_use]
    pub fn with_auto_redirect(mut self, auto_redirect: bool) -> Self {
        self.auto_redirect = auto_redirect;
        self
    }

    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.retry_backoff = Some(backoff);
        self
    }

    /// Connect timeout with the zero default resolved.
    #[must_use]
    pub fn effective_connect_timeout(&self) -> Duration {
        if self.connect_timeout.is_zero() {
            DEFAULT_CONNECT_TIMEOUT
        } else {
            self.connect_timeout
        }
    }
}

/// Kind of proxy server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    #[default]
    Http,
    Https,
    Socks4,
    Socks4a,
    Socks5,
}

/// Password that is wiped on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// Proxy to route requests through. An empty hostname disables proxying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxySetting {
    pub hostname: String,
    pub port: u16,
    pub kind: ProxyKind,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

impl ProxySetting {
    #[must_use]
    pub fn new(hostname: impl Into<String>, port: u16, kind: ProxyKind) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            kind,
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::new(password));
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.hostname.is_empty()
    }
}

/// Certificate verification settings. Both checks are on by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsSetting {
    /// Verify the server certificate chain (default: true)
    pub verify_peer: bool,

    /// Verify that the certificate matches the host name (default: true)
    pub verify_host: bool,

    /// Extra PEM bundle of trusted roots, added to the system roots
    pub ca_file: Option<PathBuf>,
}

impl Default for TlsSetting {
    fn default() -> Self {
        Self {
            verify_peer: true,
            verify_host: true,
            ca_file: None,
        }
    }
}

impl TlsSetting {
    /// Disable every certificate check. Only for tests against self-signed servers.
    #[must_use]
    pub fn insecure() -> Self {
        Self {
            verify_peer: false,
            verify_host: false,
            ca_file: None,
        }
    }

    #[must_use]
    pub fn with_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }
}

/// Everything a client and its process need, loadable from YAML and env.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpkitConfig {
    pub client: ClientOption,
    pub proxy: ProxySetting,
    pub tls: TlsSetting,
    pub logging: LogConfig,
}

/// Configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
#[error("failed to load configuration: {0}")]
pub struct ConfigError(#[from] Box<figment::Error>);

impl HttpkitConfig {
    /// Merge defaults, an optional YAML file and `HTTPKIT_*` variables.
    ///
    /// Nested keys use `__` in variable names, e.g.
    /// `HTTPKIT_CLIENT__RETRY_COUNT=3` or `HTTPKIT_TLS__VERIFY_PEER=false`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a source cannot be parsed or a value has
    /// the wrong type. A missing YAML file is not an error.
    pub fn load(yaml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = yaml_path {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError(Box::new(e)))
    }
}

/// Durations as humantime strings (`"250ms"`, `"5s"`) or integer milliseconds.
mod humantime_duration {
    use std::fmt;
    use std::time::Duration;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration such as \"5s\" or a number of milliseconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                humantime::parse_duration(v.trim()).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration::from_millis(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                u64::try_from(v)
                    .map(Duration::from_millis)
                    .map_err(|_| E::custom("duration must not be negative"))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}
