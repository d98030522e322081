//! Authorization of protocol picture uploads.
//!
//! Pictures are uploaded by the clients directly to an external image host. The core only
//! reserves a public id on the protocol and hands out a signed upload token.

use chrono::{DateTime, Utc};
use log::info;
use snafu::prelude::*;
use uuid::Uuid;

use crate::config::*;
use crate::store::ProtocolStore;

/// Signs the parameters of an upload request.
pub trait UploadSigner: Send + Sync {
    fn api_key(&self) -> &str;

    fn sign(&self, params: &[(&str, String)]) -> String;
}

/// Signs the `key=value` pairs, sorted by key and joined with `&`, followed by the secret,
/// as a hex-encoded SHA-256 digest.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Sha256Signer {
    pub api_key: String,
    pub api_secret: String,
}

impl UploadSigner for Sha256Signer {
    fn api_key(&self) -> &str {
        self.api_key.as_str()
    }

    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let joined: Vec<String> = sorted.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        sha256::digest(format!("{}{}", joined.join("&"), self.api_secret))
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct UploadToken {
    pub api_key: String,
    pub public_id: Uuid,
    pub timestamp: i64,
    pub signature: String,
}

/// Reserves a new picture id on the protocol and signs the corresponding upload.
pub fn authorize_image<S: ProtocolStore + ?Sized>(
    store: &S,
    id: &ProtocolId,
    signer: &dyn UploadSigner,
    now: DateTime<Utc>,
) -> CountingResult<UploadToken> {
    let mut protocol = store.find_by_id(id).context(NotFoundSnafu {
        entity: "protocol",
        key: id.to_string(),
    })?;
    let read_revision = protocol.revision;

    let public_id = Uuid::new_v4();
    let timestamp = now.timestamp();
    let signature = signer.sign(&[
        ("public_id", public_id.hyphenated().to_string()),
        ("timestamp", timestamp.to_string()),
    ]);

    protocol.image_ids.insert(public_id);
    protocol.update_time = now;
    let stored = store.compare_and_swap(protocol, read_revision)?;
    info!(
        "Protocol {}: authorized picture {} ({} pictures)",
        id,
        public_id,
        stored.image_ids.len()
    );

    Ok(UploadToken {
        api_key: signer.api_key().to_string(),
        public_id,
        timestamp,
        signature,
    })
}

/// The public addresses of the pictures of a protocol.
pub fn image_urls(protocol: &Protocol, base_url: &str, cloud_name: &str) -> Vec<String> {
    protocol
        .image_ids
        .iter()
        .map(|public_id| {
            format!(
                "{}/{}/image/upload/{}",
                base_url.trim_end_matches('/'),
                cloud_name,
                public_id.hyphenated()
            )
        })
        .collect()
}
