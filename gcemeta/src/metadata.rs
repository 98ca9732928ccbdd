use std::env;

use reqwest::{header::ETAG, StatusCode};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable used to override the metadata service host
pub const GCE_METADATA_HOST_ENV_VAR: &str = "GCE_METADATA_HOST";

/// Default metadata service host
///
/// A literal IP is used rather than `metadata.google.internal` so that requests
/// do not depend on DNS search suffixes and cannot be redirected by a resolver
pub const DEFAULT_METADATA_HOST: &str = "169.254.169.254";

/// URL probed to determine whether the process is running on GCE
pub const PROBE_URL: &str = "http://metadata.google.internal";

const METADATA_FLAVOR: &str = "Metadata-Flavor";
const METADATA_FLAVOR_VALUE: &str = "Google";
const METADATA_PATH_PREFIX: &str = "computeMetadata/v1";

/// Where metadata requests are sent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
  /// Metadata service host (hostname or IP, optionally with a port)
  pub host: String,

  /// URL requested by the presence probe
  pub probe_url: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      host: DEFAULT_METADATA_HOST.to_string(),
      probe_url: PROBE_URL.to_string(),
    }
  }
}

impl Config {
  /// Create a configuration for the given host
  ///
  /// An unset or empty host falls back to [`DEFAULT_METADATA_HOST`]
  pub fn new(host: Option<String>) -> Self {
    match host.filter(|h| !h.is_empty()) {
      Some(host) => Self {
        host,
        ..Default::default()
      },
      None => Self::default(),
    }
  }

  /// Create a configuration from the `GCE_METADATA_HOST` environment variable
  pub fn from_env() -> Self {
    Self::new(env::var(GCE_METADATA_HOST_ENV_VAR).ok())
  }

  /// Replace the URL requested by the presence probe
  pub fn with_probe_url(mut self, probe_url: impl Into<String>) -> Self {
    self.probe_url = probe_url.into();
    self
  }
}

/// A value returned by the metadata service
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataValue {
  /// The raw response body
  pub value: String,
  /// The response `Etag` header, empty when the service did not send one
  pub etag: String,
}

/// A client for the GCE metadata service
#[derive(Debug)]
pub struct Client {
  config: Config,
  inner: reqwest::Client,
  on_gce: OnceCell<bool>,
}

impl Client {
  /// Create a client for the given configuration
  pub fn new(config: Config) -> Self {
    Self {
      config,
      inner: reqwest::Client::new(),
      on_gce: OnceCell::new(),
    }
  }

  /// Create a client configured from the `GCE_METADATA_HOST` environment variable
  pub fn from_env() -> Self {
    Self::new(Config::from_env())
  }

  /// The configuration requests are sent with
  pub fn config(&self) -> &Config {
    &self.config
  }

  /// The URL requested for the given metadata path
  pub fn resolve_url(&self, path: &str) -> String {
    format!("http://{}/{METADATA_PATH_PREFIX}/{path}", self.config.host)
  }

  /// Fetch the value and `Etag` stored at `path`
  ///
  /// A 404 response is reported as [`Error::NotFound`] carrying `path`
  pub async fn fetch(&self, path: &str) -> Result<MetadataValue> {
    let url = self.resolve_url(path);
    debug!("Fetching metadata from {url}");

    let response = self
      .inner
      .get(&url)
      .header(METADATA_FLAVOR, METADATA_FLAVOR_VALUE)
      .send()
      .await?;

    match response.status() {
      StatusCode::OK => {}
      StatusCode::NOT_FOUND => return Err(Error::NotFound(path.to_owned())),
      status => {
        return Err(Error::UnexpectedStatus {
          status: status.as_u16(),
          url,
        })
      }
    }

    let etag = response
      .headers()
      .get(ETAG)
      .and_then(|v| v.to_str().ok())
      .unwrap_or_default()
      .to_owned();
    let value = response.text().await?;

    Ok(MetadataValue { value, etag })
  }

  /// Fetch the raw value stored at `path`
  pub async fn get(&self, path: &str) -> Result<String> {
    Ok(self.fetch(path).await?.value)
  }

  /// Fetch the value stored at `path` with surrounding whitespace removed
  pub async fn fetch_trimmed(&self, path: &str) -> Result<String> {
    Ok(self.get(path).await?.trim().to_owned())
  }

  /// Fetch a newline delimited listing stored at `path`
  pub async fn fetch_lines(&self, path: &str) -> Result<Vec<String>> {
    let body = self.get(path).await?;

    Ok(body.trim().split('\n').map(|l| l.trim().to_owned()).collect())
  }

  /// Report whether the process is running on GCE
  ///
  /// The probe runs at most once per client; concurrent callers wait on the first result.
  /// Any transport failure is treated as not running on GCE.
  pub async fn probe_presence(&self) -> bool {
    *self
      .on_gce
      .get_or_init(|| probe(&self.inner, &self.config.probe_url))
      .await
  }

  /// The project ID
  pub async fn project_id(&self) -> Result<String> {
    self.fetch_trimmed("project/project-id").await
  }

  /// The numeric project ID, which is not the same as the project name
  pub async fn numeric_project_id(&self) -> Result<String> {
    self.fetch_trimmed("project/numeric-project-id").await
  }

  /// The primary internal IP address
  pub async fn internal_ip(&self) -> Result<String> {
    self.fetch_trimmed("instance/network-interfaces/0/ip").await
  }

  /// The primary external (public) IP address
  pub async fn external_ip(&self) -> Result<String> {
    self
      .fetch_trimmed("instance/network-interfaces/0/access-configs/0/external-ip")
      .await
  }

  /// The full hostname, of the form `<instance>.c.<project>.internal`
  pub async fn hostname(&self) -> Result<String> {
    self.fetch_trimmed("instance/hostname").await
  }

  /// The free-text description of the instance
  pub async fn description(&self) -> Result<String> {
    self.fetch_trimmed("instance/description").await
  }

  /// The numeric instance ID
  pub async fn instance_id(&self) -> Result<String> {
    self.fetch_trimmed("instance/id").await
  }

  /// The zone, such as `us-central1-b`
  pub async fn zone(&self) -> Result<String> {
    // projects/<number>/zones/<zone>
    let zone = self.fetch_trimmed("instance/zone").await?;
    Ok(last_segment(&zone).to_owned())
  }

  /// The machine type, such as `n1-standard-1`
  pub async fn machine_type(&self) -> Result<String> {
    // projects/<number>/machineTypes/<machine-type>
    let machine = self.fetch_trimmed("instance/machine-type").await?;
    Ok(last_segment(&machine).to_owned())
  }

  /// The short instance name, taken from the first label of the hostname
  pub async fn instance_name(&self) -> Result<String> {
    let hostname = self.hostname().await?;
    Ok(hostname.split('.').next().unwrap_or_default().to_owned())
  }

  /// The user-defined network tags assigned to the instance
  ///
  /// A `null` document is treated as no tags
  pub async fn instance_tags(&self) -> Result<Vec<String>> {
    let tags = self.get("instance/tags").await?;
    let tags: Option<Vec<String>> = serde_json::from_str(&tags)?;
    Ok(tags.unwrap_or_default())
  }

  /// The names of user-defined instance attributes
  ///
  /// Values are retrieved with [`Client::instance_attribute_value`]
  pub async fn instance_attributes(&self) -> Result<Vec<String>> {
    self.fetch_lines("instance/attributes/").await
  }

  /// The value of a user-defined instance attribute
  ///
  /// The value is returned untrimmed and may be empty. An undefined attribute
  /// is reported as [`Error::NotFound`].
  pub async fn instance_attribute_value(&self, name: &str) -> Result<String> {
    self.get(&format!("instance/attributes/{name}")).await
  }
}

/// Issue the presence probe, without the metadata flavor request header
async fn probe(client: &reqwest::Client, url: &str) -> bool {
  match client.get(url).send().await {
    Ok(response) => {
      let flavor = response.headers().get(METADATA_FLAVOR).and_then(|v| v.to_str().ok());
      debug!("Metadata service probe of {url} returned flavor {flavor:?}");
      flavor == Some(METADATA_FLAVOR_VALUE)
    }
    Err(err) => {
      debug!("Metadata service probe of {url} failed: {err}");
      false
    }
  }
}

/// Everything after the last `/`
fn last_segment(value: &str) -> &str {
  value.rsplit_once('/').map_or(value, |(_, tail)| tail)
}

static ON_GCE: OnceCell<bool> = OnceCell::const_new();

/// Report whether this process is running on GCE
///
/// Uses the environment derived configuration and is evaluated once per process
pub async fn on_gce() -> bool {
  *ON_GCE
    .get_or_init(|| async { Client::from_env().probe_presence().await })
    .await
}
