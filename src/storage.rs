//! Blob storage for avatars and identity documents.
//!
//! Clients either send a freshly captured image inline (a `data:image/...`
//! URL) or echo back the URL of an object stored earlier. Only the first
//! one is uploaded.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::user::Document;

/// Prefix of freshly captured inline image data.
pub const INLINE_IMAGE_MARKER: &str = "data:image";

/// Whether `value` must be uploaded rather than passed through.
pub fn is_inline_image(value: &str) -> bool {
    value.starts_with(INLINE_IMAGE_MARKER)
}

/// Errors raised while storing an object.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("inline image must look like `data:image/<type>;base64,<data>`")]
    Malformed,
    #[error("inline image is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("cannot write object: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Failure of the backend rather than of the submitted data.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Io(_))
    }
}

/// Folder an object is stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Avatar,
    SelfPhotoImg,
    IdFrontImg,
    IdReverseImg,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Avatar => "avatar",
            AssetKind::SelfPhotoImg => "self_photo_img",
            AssetKind::IdFrontImg => "id_front_img",
            AssetKind::IdReverseImg => "id_reverse_img",
        }
    }
}

impl From<Document> for AssetKind {
    fn from(document: Document) -> Self {
        match document {
            Document::SelfPhoto => AssetKind::SelfPhotoImg,
            Document::IdFront => AssetKind::IdFrontImg,
            Document::IdReverse => AssetKind::IdReverseImg,
        }
    }
}

/// Port for object storage.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Upload inline image data and return its public URL. Any other value is
    /// an already stored reference and is returned unchanged.
    async fn store(&self, value: &str, kind: AssetKind) -> Result<String, StorageError>;
}

/// Content-addressed storage on local disk, served from `public_url`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_url: String,
}

impl LocalStorage {
    /// Create a new [`LocalStorage`].
    pub fn new(root: impl AsRef<Path>, public_url: &str) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            public_url: public_url.trim_end_matches('/').to_owned(),
        }
    }
}

#[async_trait]
impl BlobStorage for LocalStorage {
    async fn store(&self, value: &str, kind: AssetKind) -> Result<String, StorageError> {
        if !is_inline_image(value) {
            return Ok(value.to_owned());
        }

        let (extension, bytes) = decode_inline_image(value)?;
        let name = format!("{}.{extension}", hex::encode(Sha256::digest(&bytes)));

        let directory = self.root.join(kind.as_str());
        tokio::fs::create_dir_all(&directory).await?;

        let path = directory.join(&name);
        if !tokio::fs::try_exists(&path).await? {
            tokio::fs::write(&path, &bytes).await?;
            tracing::debug!(path = %path.display(), size = bytes.len(), "object stored");
        }

        Ok(format!("{}/{}/{name}", self.public_url, kind.as_str()))
    }
}

/// Split `data:image/<type>;base64,<data>` into a file extension and the
/// decoded bytes.
fn decode_inline_image(value: &str) -> Result<(String, Vec<u8>), StorageError> {
    let (header, data) = value
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or(StorageError::Malformed)?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or(StorageError::Malformed)?;
    let extension = match mime.strip_prefix("image/") {
        Some("jpeg") | Some("jpg") => "jpg",
        Some("svg+xml") => "svg",
        Some(subtype)
            if !subtype.is_empty()
                && subtype.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            subtype
        },
        _ => return Err(StorageError::Malformed),
    };

    let bytes = BASE64_STANDARD.decode(data.trim())?;
    if bytes.is_empty() {
        return Err(StorageError::Malformed);
    }

    Ok((extension.to_ascii_lowercase(), bytes))
}

/// In-memory storage recording every upload.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    uploads: std::sync::Mutex<Vec<(AssetKind, String)>>,
    unavailable: bool,
}

#[cfg(test)]
impl MemoryStorage {
    /// Storage failing every upload.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    /// Every uploaded value, in order.
    pub fn uploads(&self) -> Vec<(AssetKind, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl BlobStorage for MemoryStorage {
    async fn store(&self, value: &str, kind: AssetKind) -> Result<String, StorageError> {
        if !is_inline_image(value) {
            return Ok(value.to_owned());
        }
        decode_inline_image(value)?;
        if self.unavailable {
            return Err(StorageError::Io(std::io::Error::other("bucket offline")));
        }

        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((kind, value.to_owned()));
        Ok(format!("https://cdn.test/{}/{}.png", kind.as_str(), uploads.len()))
    }
}
