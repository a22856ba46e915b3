//! HTTP(S) transport.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::{debug, info};

use super::{Transport, TransportError};
use crate::reference::HttpReference;

/// Fetches artifacts with a blocking `GET`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: Client,
}

impl HttpTransport {
  /// Build a transport whose requests time out after `timeout`.
  pub fn new(timeout: Duration) -> Result<Self, TransportError> {
    let client = Client::builder()
      .timeout(timeout)
      .user_agent(concat!("mkfetch/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(TransportError::Client)?;
    Ok(Self { client })
  }
}

impl Transport<HttpReference> for HttpTransport {
  fn fetch(&self, reference: &HttpReference) -> Result<Vec<u8>, TransportError> {
    let url = reference.url();
    info!(url, "fetching URL");

    let request_error = |source| TransportError::Request {
      url: url.to_string(),
      source,
    };

    let response = self.client.get(url).send().map_err(request_error)?;

    let status = response.status();
    if status != StatusCode::OK {
      return Err(TransportError::Status {
        url: url.to_string(),
        status: status.as_u16(),
      });
    }

    let bytes = response.bytes().map_err(request_error)?;
    debug!(url, size = bytes.len(), "download complete");
    Ok(bytes.to_vec())
  }
}
