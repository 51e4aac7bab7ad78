//! Transfer Task interface and the default SFTP implementation.

pub mod progress;
pub mod sftp;

use crate::utils::errors::Result;
use std::fmt;
use std::path::PathBuf;

pub use sftp::SftpUploader;

/// Everything the Transfer Task needs to ship one archive
#[derive(Clone)]
pub struct TransferRequest {
    /// Archive file, or directory for uncompressed backups
    pub file: PathBuf,
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub remote_dir: String,
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("file", &self.file)
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("remote_dir", &self.remote_dir)
            .finish()
    }
}

/// Ships one archive to remote storage per call.
///
/// Implementations run on a blocking worker thread; `Ok` means the archive
/// reached its destination completely.
pub trait Uploader: Send + Sync {
    fn upload(&self, request: &TransferRequest) -> Result<()>;
}
