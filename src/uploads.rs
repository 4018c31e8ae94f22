use crate::errors::DeskError;
use crate::settings::Uploads;
use base64ct::Encoding;
use rand::RngCore;
use std::path::{Path, PathBuf};

/// Public URL prefix the upload directory is served under.
pub const PUBLIC_PREFIX: &str = "/uploads";

const MAX_EXTENSION_LEN: usize = 8;

/// Local directory holding uploaded property images.
#[derive(Clone, Debug)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(cfg: &Uploads) -> Self {
        Self {
            dir: cfg.dir.clone(),
            max_bytes: cfg.max_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub async fn ensure_dir(&self) -> Result<(), DeskError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Reject empty or oversize content without touching the disk.
    pub fn check(&self, bytes: &[u8]) -> Result<(), DeskError> {
        if bytes.is_empty() {
            return Err(DeskError::BadRequest("Uploaded file is empty".into()));
        }
        if bytes.len() > self.max_bytes {
            return Err(DeskError::BadRequest(format!(
                "Uploaded file exceeds {} bytes",
                self.max_bytes
            )));
        }
        Ok(())
    }

    /// Store `bytes` under a fresh random name and return its public path.
    pub async fn save(&self, original_name: Option<&str>, bytes: &[u8]) -> Result<String, DeskError> {
        self.check(bytes)?;

        let name = match original_name.and_then(sanitized_extension) {
            Some(ext) => format!("{}.{}", random_name(), ext),
            None => random_name(),
        };

        self.ensure_dir().await?;
        tokio::fs::write(self.dir.join(&name), bytes).await?;
        tracing::info!(file = %name, size = bytes.len(), "stored upload");

        Ok(format!("{PUBLIC_PREFIX}/{name}"))
    }

    /// Delete a file previously returned by [`UploadStore::save`].
    pub async fn remove(&self, public_path: &str) -> Result<(), DeskError> {
        let name = public_path
            .strip_prefix(PUBLIC_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty() && !name.contains(['/', '\\']) && *name != "..")
            .ok_or_else(|| DeskError::BadRequest(format!("Not an upload path: {public_path}")))?;
        tokio::fs::remove_file(self.dir.join(name)).await?;
        Ok(())
    }

    /// Best-effort removal of stored files after a failed request.
    pub async fn discard(&self, public_paths: &[String]) {
        for path in public_paths {
            if let Err(e) = self.remove(path).await {
                tracing::warn!(file = %path, error = %e, "failed to discard upload");
            }
        }
    }
}

/// Lower-cased extension of `name` if it is short and alphanumeric.
fn sanitized_extension(name: &str) -> Option<String> {
    let file_name = Path::new(name).file_name()?.to_str()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty()
        || ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn random_name() -> String {
    let mut bytes = [0u8; 18];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}
