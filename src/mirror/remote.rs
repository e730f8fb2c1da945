use crate::model::MirrorConfig;
use anyhow::{Context, Result};
use std::fs::File;
use std::net::ToSocketAddrs;
use std::path::Path;
use suppaftp::types::FileType;
use suppaftp::FtpStream;

/// Seam over the remote archive so the mirror loop can be exercised without a
/// live FTP server. All paths are relative to the directory the source was
/// opened on.
pub trait RemoteSource {
    /// Names of the files under the current remote directory.
    fn list(&mut self) -> Result<Vec<String>>;

    /// Remote byte size of `name`.
    fn size(&mut self, name: &str) -> Result<u64>;

    /// Stream `name` into `dest`, overwriting it. Returns bytes written.
    fn fetch(&mut self, name: &str, dest: &Path) -> Result<u64>;
}

/// FTP-backed source. One instance corresponds to one logged-in session
/// parked on a single remote directory; batch mode opens a fresh session per
/// directory so a stalled transfer never poisons later ones.
pub struct FtpSource {
    ftp: FtpStream,
}

impl FtpSource {
    pub fn connect(cfg: &MirrorConfig, remote_dir: &str) -> Result<Self> {
        let addr = (cfg.host.as_str(), cfg.port)
            .to_socket_addrs()
            .with_context(|| format!("resolving {}:{}", cfg.host, cfg.port))?
            .next()
            .with_context(|| format!("no address found for {}", cfg.host))?;

        let mut ftp = FtpStream::connect_timeout(addr, cfg.timeout)
            .with_context(|| format!("connecting to {}", cfg.host))?;
        ftp.login(&cfg.username, &cfg.password)
            .with_context(|| format!("logging in to {} as {}", cfg.host, cfg.username))?;
        // SIZE and RETR byte counts are only meaningful in binary mode.
        ftp.transfer_type(FileType::Binary)
            .context("switching to binary transfer mode")?;
        ftp.cwd(remote_dir)
            .with_context(|| format!("changing to remote directory {remote_dir}"))?;

        Ok(Self { ftp })
    }

    pub fn quit(mut self) {
        let _ = self.ftp.quit();
    }
}

impl RemoteSource for FtpSource {
    fn list(&mut self) -> Result<Vec<String>> {
        let names = self.ftp.nlst(None).context("listing remote directory")?;
        Ok(names)
    }

    fn size(&mut self, name: &str) -> Result<u64> {
        let size = self
            .ftp
            .size(name)
            .with_context(|| format!("querying remote size of {name}"))?;
        Ok(size as u64)
    }

    fn fetch(&mut self, name: &str, dest: &Path) -> Result<u64> {
        let mut reader = self
            .ftp
            .retr_as_stream(name)
            .with_context(|| format!("requesting {name}"))?;
        let mut file = File::create(dest)
            .with_context(|| format!("creating {}", dest.display()))?;
        let bytes = std::io::copy(&mut reader, &mut file)
            .with_context(|| format!("writing {}", dest.display()))?;
        self.ftp
            .finalize_retr_stream(reader)
            .with_context(|| format!("finalizing transfer of {name}"))?;
        Ok(bytes)
    }
}
