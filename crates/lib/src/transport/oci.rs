//! OCI registry transport.
//!
//! The registry protocol is handled by `oci-client`. Its API is async, so the
//! transport owns a current-thread tokio runtime and blocks on each pull,
//! keeping the rest of the crate synchronous.

use oci_client::client::{ClientConfig, ClientProtocol};
use oci_client::secrets::RegistryAuth;
use oci_client::{Client, Reference as ImageReference};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use super::{Transport, TransportError};
use crate::reference::{OciReference, OciTarget};

/// Pulls the first layer of an OCI artifact.
pub struct OciTransport {
  client: Client,
  auth: RegistryAuth,
  runtime: Runtime,
}

impl OciTransport {
  /// Anonymous transport. With `insecure`, registries are reached over plain HTTP.
  pub fn new(insecure: bool) -> Result<Self, TransportError> {
    let protocol = if insecure {
      ClientProtocol::Http
    } else {
      ClientProtocol::Https
    };
    let client = Client::new(ClientConfig {
      protocol,
      ..Default::default()
    });
    let runtime = Builder::new_current_thread()
      .enable_all()
      .build()
      .map_err(TransportError::Runtime)?;

    Ok(Self {
      client,
      auth: RegistryAuth::Anonymous,
      runtime,
    })
  }

  /// Authenticate with a username and password (or token).
  pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
    self.auth = RegistryAuth::Basic(username.into(), password.into());
    self
  }

  async fn pull_first_layer(&self, image: &ImageReference, shown: &str) -> Result<Vec<u8>, TransportError> {
    let (manifest, manifest_digest) = self
      .client
      .pull_image_manifest(image, &self.auth)
      .await
      .map_err(|e| TransportError::ManifestFetch {
        reference: shown.to_string(),
        source: Box::new(e),
      })?;
    debug!(reference = shown, digest = %manifest_digest, layers = manifest.layers.len(), "pulled manifest");

    let layer = manifest.layers.first().ok_or_else(|| TransportError::NoLayers {
      reference: shown.to_string(),
    })?;

    let mut data = Vec::with_capacity(usize::try_from(layer.size).unwrap_or_default());
    self
      .client
      .pull_blob(image, layer, &mut data)
      .await
      .map_err(|e| TransportError::LayerFetch {
        reference: shown.to_string(),
        digest: layer.digest.clone(),
        source: Box::new(e),
      })?;

    Ok(data)
  }
}

impl Transport<OciReference> for OciTransport {
  fn fetch(&self, reference: &OciReference) -> Result<Vec<u8>, TransportError> {
    let shown = reference.to_string();
    info!(reference = %shown, "pulling artifact");

    let image = image_reference(reference);
    self.runtime.block_on(self.pull_first_layer(&image, &shown))
  }
}

/// Map onto the client's reference type without re-parsing, so no registry
/// defaulting or `library/` prefixing is applied on top of ours.
fn image_reference(reference: &OciReference) -> ImageReference {
  let registry = reference.registry.clone();
  let repository = reference.repository.clone();
  match &reference.target {
    OciTarget::Tag(tag) => ImageReference::with_tag(registry, repository, tag.clone()),
    OciTarget::Digest(digest) => ImageReference::with_digest(registry, repository, digest.to_string()),
  }
}
