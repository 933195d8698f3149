// m3-core/src/installer.rs
//! Forge installer download, stale artifact cleanup and server install.
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use glob::Pattern;
use m3_common::error::{M3Error, ResolutionError, Result};
use m3_common::model::RawInstaller;
use m3_common::pipeline::{FetchCompletion, TransferStats};
use m3_net::checksum::{verify_and_purge, Checksum, HashRegistry, Verification};
use m3_net::fetch::{execute, FetchRequest, Fetchable, Transport};
use tokio::process::Command;
use tracing::{debug, error, info};

const MAVEN_BASE: &str = "https://maven.minecraftforge.net/net/minecraftforge/forge";
const LIBRARIES_DIR: &str = "libraries";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installer {
    pub version: String,
    checksum: Checksum,
    server_checksum: Checksum,
    filename: String,
    url: String,
}

impl Installer {
    /// A server checksum without an algorithm prefix uses the algorithm of
    /// the installer checksum.
    pub fn from_raw(
        raw: &RawInstaller,
        registry: &HashRegistry,
    ) -> std::result::Result<Self, ResolutionError> {
        let version = raw.version.trim().to_string();
        let label = format!("forge {version}");
        if version.contains(['/', '\\']) || version == ".." {
            return Err(ResolutionError::InvalidField {
                record: label,
                field: "version",
                value: version,
            });
        }
        let checksum = registry
            .parse_checksum(&raw.checksum)
            .map_err(|e| e.for_record(&label))?;
        let server_checksum = if raw.server_checksum.contains(':') {
            registry
                .parse_checksum(&raw.server_checksum)
                .map_err(|e| e.for_record(&label))?
        } else {
            Checksum::new(checksum.algorithm, raw.server_checksum.clone())
        };
        Ok(Self {
            filename: format!("forge-{version}-installer.jar"),
            url: format!("{MAVEN_BASE}/{version}/forge-{version}-installer.jar"),
            version,
            checksum,
            server_checksum,
        })
    }

    pub fn is_declared(&self) -> bool {
        !self.version.is_empty()
    }

    pub fn universal_filename(&self) -> String {
        format!("forge-{}-universal.jar", self.version)
    }

    /// Removes installer and universal jars of other versions and verifies
    /// the ones matching this version. A stale universal jar takes the
    /// `libraries` directory with it.
    pub fn prepare(&self, work_dir: &Path) -> Result<()> {
        for path in matching(work_dir, "forge-*-installer.jar")? {
            if file_name(&path) == self.filename {
                self.verify(&path, &self.checksum)?;
            } else {
                remove_path(&path)?;
            }
        }

        let universal = self.universal_filename();
        for path in matching(work_dir, "forge-*-universal.jar")? {
            if file_name(&path) == universal {
                self.verify(&path, &self.server_checksum)?;
            } else {
                remove_path(&path)?;
                remove_path(&work_dir.join(LIBRARIES_DIR))?;
            }
        }
        Ok(())
    }

    fn verify(&self, path: &Path, checksum: &Checksum) -> Result<()> {
        if verify_and_purge(path, checksum)? == Verification::Purged {
            info!("Removed {} (checksum mismatch)", path.display());
        }
        Ok(())
    }

    /// Prepares `work_dir` then downloads the installer unless a verified
    /// copy is already there.
    pub async fn fetch(
        &self,
        work_dir: &Path,
        transport: Arc<dyn Transport>,
    ) -> Result<FetchCompletion> {
        self.prepare(work_dir)?;
        let destination = work_dir.join(&self.filename);
        if destination.exists() {
            let size = fs::metadata(&destination)?.len();
            debug!("{} already present", self.filename);
            return Ok(FetchCompletion::success(
                self.filename.clone(),
                destination,
                TransferStats {
                    bytes_transferred: 0,
                    total_size: Some(size),
                },
            ));
        }
        Ok(execute(FetchRequest::for_fetchable(self, work_dir), transport).await)
    }

    pub fn install_args(&self) -> Vec<String> {
        vec![
            "-jar".to_string(),
            self.filename.clone(),
            "--installServer".to_string(),
        ]
    }

    /// Runs the installer in server mode inside `work_dir`. With
    /// `forward_output` the child's streams go to the terminal, otherwise
    /// they are captured and logged at debug level.
    pub async fn install_server(
        &self,
        work_dir: &Path,
        java_bin: &str,
        forward_output: bool,
    ) -> Result<()> {
        let args = self.install_args();
        debug!("Running {} {:?} in {}", java_bin, args, work_dir.display());

        let mut cmd = Command::new(java_bin);
        cmd.args(&args);
        cmd.current_dir(work_dir);
        cmd.kill_on_drop(true);
        cmd.stdin(Stdio::null());
        if forward_output {
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        }

        let output = cmd.output().await.map_err(|e| {
            error!("Failed to execute {}: {}", java_bin, e);
            M3Error::CommandExecError(format!("Failed to execute {java_bin}: {e}"))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!("Stdout:\n{}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("Stderr:\n{}", stderr.trim());
        }

        if output.status.success() {
            info!("Installed Forge {} server files", self.version);
            Ok(())
        } else {
            Err(M3Error::CommandExecError(format!(
                "Forge installer exited with {}",
                output.status
            )))
        }
    }
}

impl Fetchable for Installer {
    fn url(&self) -> &str {
        &self.url
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn checksum(&self) -> &Checksum {
        &self.checksum
    }
}

fn matching(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = format!(
        "{}/{}",
        Pattern::escape(&dir.to_string_lossy()),
        pattern
    );
    let paths = glob::glob(&full)
        .map_err(|e| M3Error::Generic(format!("Invalid glob pattern {full}: {e}")))?;
    Ok(paths.filter_map(|p| p.ok()).collect())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn remove_path(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => {
            debug!("Removed stale {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(M3Error::IoError(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}
