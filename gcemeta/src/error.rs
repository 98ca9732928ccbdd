use thiserror::Error;

/// Errors returned when querying the metadata service
#[derive(Debug, Error)]
pub enum Error {
  /// The requested metadata path is not defined (HTTP 404)
  ///
  /// Carries the path that was requested
  #[error("metadata: GCE metadata {0:?} not defined")]
  NotFound(String),

  /// The metadata service answered with a status other than 200 or 404
  #[error("status code {status} trying to fetch {url}")]
  UnexpectedStatus { status: u16, url: String },

  /// The request could not be completed (DNS, refused connection, timeout, body I/O)
  #[error("unable to reach metadata service: {0}")]
  Transport(#[from] reqwest::Error),

  /// The value could not be decoded where a JSON document was expected
  #[error("unable to parse metadata value: {0}")]
  Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
