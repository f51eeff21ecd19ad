// Token persistence in the worker repo

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::io::AsyncWriteExt;

use crate::error::{AuthError, Result};

use super::types::TokenPair;

/// Fixed name of the token file inside the working directory
pub const TOKEN_FILE: &str = "sealing_market_tokens.json";

/// On-disk home of the current token pair
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    tokens: TokenPair,
}

impl CredentialStore {
    /// Open the token file in `working_dir`, creating it if missing
    ///
    /// The directory itself must already exist. A non-empty file is parsed
    /// eagerly so a corrupted file is reported at startup.
    pub fn open(working_dir: &Path) -> Result<Self> {
        if !working_dir.is_dir() {
            return Err(AuthError::io(
                format!("working directory does not exist: {}", working_dir.display()),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }

        let path = working_dir.join(TOKEN_FILE);
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| AuthError::io(format!("open tokens file {}", path.display()), e))?;

        let contents = fs::read_to_string(&path)
            .map_err(|e| AuthError::io(format!("read tokens file {}", path.display()), e))?;

        let tokens = if contents.trim().is_empty() {
            tracing::debug!("Token file {} is empty, no credentials yet", path.display());
            TokenPair::default()
        } else {
            serde_json::from_str(&contents)
                .map_err(|e| AuthError::parse(format!("tokens file {}", path.display()), e))?
        };

        Ok(Self { path, tokens })
    }

    /// Last parsed or persisted pair
    pub fn load(&self) -> TokenPair {
        self.tokens.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file contents with `tokens` (write tmp + rename)
    ///
    /// A reader never sees a partially written file: either the old
    /// contents or the new ones. All file I/O goes through `tokio::fs`,
    /// so a slow disk parks this task, not a runtime worker.
    pub async fn persist(&mut self, tokens: &TokenPair) -> Result<()> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let json = serde_json::to_vec(tokens)
            .map_err(|e| AuthError::parse("serialize tokens", e))?;

        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_path = self
            .path
            .with_file_name(format!("{}.{}.{}.tmp", TOKEN_FILE, std::process::id(), seq));

        if let Err(e) = write_synced(&tmp_path, &json).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(AuthError::io(format!("write tokens to {}", tmp_path.display()), e));
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(AuthError::io(
                format!("replace tokens file {}", self.path.display()),
                e,
            ));
        }

        self.tokens = tokens.clone();
        Ok(())
    }
}

/// `write_all` turns a short write into `WriteZero`
async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}
