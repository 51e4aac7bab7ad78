//! SFTP uploads over ssh2.
//!
//! Files are written as `<name>.part` and renamed once complete, so the remote
//! side never holds a truncated archive under its final name.

use super::progress::ProgressReporter;
use super::{TransferRequest, Uploader};
use crate::utils::errors::{BackupError, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const CHUNK_SIZE: usize = 256 * 1024;

/// Uploads archives with password authentication
#[derive(Debug, Default, Clone, Copy)]
pub struct SftpUploader;

impl SftpUploader {
    pub fn new() -> Self {
        Self
    }
}

impl Uploader for SftpUploader {
    fn upload(&self, request: &TransferRequest) -> Result<()> {
        let name = request.file.file_name().ok_or_else(|| {
            BackupError::Transfer(format!("{} has no file name", request.file.display()))
        })?;

        info!(
            "Connecting to {}:{} as {}",
            request.server, request.port, request.username
        );
        let session = connect(request)?;
        let sftp = session.sftp()?;

        let remote_root = PathBuf::from(&request.remote_dir);
        ensure_remote_dir(&sftp, &remote_root)?;
        let remote_target = remote_root.join(name);

        if request.file.is_dir() {
            upload_tree(&sftp, &request.file, &remote_target)?;
        } else {
            upload_file(&sftp, &request.file, &remote_target)?;
        }

        info!("Transferred {} to {}", request.file.display(), request.server);
        Ok(())
    }
}

fn connect(request: &TransferRequest) -> Result<ssh2::Session> {
    let tcp = TcpStream::connect((request.server.as_str(), request.port)).map_err(|e| {
        BackupError::Transfer(format!(
            "could not connect to {}:{}: {}",
            request.server, request.port, e
        ))
    })?;

    let mut session = ssh2::Session::new()?;
    session.set_tcp_stream(tcp);
    session.handshake()?;

    session
        .userauth_password(&request.username, &request.password)
        .map_err(|e| BackupError::Transfer(format!("SSH authentication failed: {}", e)))?;

    if !session.authenticated() {
        return Err(BackupError::Transfer("SSH authentication failed".into()));
    }

    Ok(session)
}

/// `mkdir -p` on the remote side
fn ensure_remote_dir(sftp: &ssh2::Sftp, dir: &Path) -> Result<()> {
    let mut current = PathBuf::new();

    for component in dir.components() {
        current.push(component);
        if sftp.stat(&current).is_ok() {
            continue;
        }
        debug!("Creating remote directory {}", current.display());
        sftp.mkdir(&current, 0o755)?;
    }

    Ok(())
}

fn upload_tree(sftp: &ssh2::Sftp, local_root: &Path, remote_root: &Path) -> Result<()> {
    for entry in WalkDir::new(local_root).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(local_root).unwrap_or(Path::new(""));
        let remote = remote_root.join(relative);

        if entry.file_type().is_dir() {
            ensure_remote_dir(sftp, &remote)?;
        } else if entry.file_type().is_file() {
            upload_file(sftp, entry.path(), &remote)?;
        }
    }

    Ok(())
}

fn upload_file(sftp: &ssh2::Sftp, local: &Path, remote: &Path) -> Result<()> {
    let mut source = File::open(local)?;
    let total_bytes = source.metadata()?.len();
    let partial = partial_path(remote);

    let mut reporter = ProgressReporter::new(local.display().to_string(), total_bytes);
    let mut remote_file = sftp.create(&partial)?;
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let read = source.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        remote_file.write_all(&buffer[..read])?;
        reporter.advance(read as u64);
    }
    remote_file.flush()?;
    drop(remote_file);

    if sftp.stat(remote).is_ok() {
        sftp.unlink(remote)?;
    }
    sftp.rename(&partial, remote, None)?;
    reporter.finish();

    Ok(())
}

fn partial_path(remote: &Path) -> PathBuf {
    let mut name = remote.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    remote.with_file_name(name)
}
