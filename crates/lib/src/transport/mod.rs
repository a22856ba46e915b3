//! Remote transports.
//!
//! A transport turns a classified remote reference into raw bytes. Transports
//! never cache; that is the resolver's job. Each remote kind has its own
//! implementation:
//!
//! - [`HttpTransport`] - plain `GET` against an HTTP(S) URL
//! - [`OciTransport`] - first layer of an OCI artifact manifest
//!
//! The resolver receives transports as trait objects, so tests can inject
//! closures in their place.

mod http;
mod oci;

use std::io;

use thiserror::Error;

pub use http::HttpTransport;
pub use oci::OciTransport;

/// Retrieves the raw bytes of a remote artifact.
pub trait Transport<R: ?Sized> {
  fn fetch(&self, reference: &R) -> Result<Vec<u8>, TransportError>;
}

impl<R: ?Sized, F> Transport<R> for F
where
  F: Fn(&R) -> Result<Vec<u8>, TransportError>,
{
  fn fetch(&self, reference: &R) -> Result<Vec<u8>, TransportError> {
    self(reference)
  }
}

/// Errors that can occur while fetching a remote artifact.
#[derive(Debug, Error)]
pub enum TransportError {
  /// The server answered with something other than 200 OK.
  #[error("GET {url} returned HTTP {status}")]
  Status { url: String, status: u16 },

  /// The HTTP request could not be completed.
  #[error("request to {url} failed: {source}")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// Failed to set up the HTTP client.
  #[error("failed to build HTTP client: {0}")]
  Client(#[source] reqwest::Error),

  /// The artifact manifest lists no layers.
  #[error("manifest for {reference} has no layers")]
  NoLayers { reference: String },

  /// The manifest could not be fetched or decoded.
  #[error("failed to fetch manifest for {reference}: {source}")]
  ManifestFetch {
    reference: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// The first layer could not be downloaded.
  #[error("failed to fetch layer {digest} of {reference}: {source}")]
  LayerFetch {
    reference: String,
    digest: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// Failed to start the runtime that drives the registry client.
  #[error("failed to start registry client runtime: {0}")]
  Runtime(#[source] io::Error),
}

impl TransportError {
  /// The HTTP status code, when the failure carried one.
  pub fn status(&self) -> Option<u16> {
    match self {
      TransportError::Status { status, .. } => Some(*status),
      TransportError::Request { source, .. } => source.status().map(|s| s.as_u16()),
      _ => None,
    }
  }
}
