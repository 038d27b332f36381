//! Named control pipe, spec §4.4: a one-shot named pipe in a well-known
//! temp location, named by the session's `active_remote_id`, used for
//! textual control commands (`ACTION=PLAY`, `VOLUME=50`, …).

use std::path::PathBuf;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::common::types::AnyResult;

pub struct ControlFifo {
    path: PathBuf,
}

impl ControlFifo {
    /// Creates the FIFO at `<tmp>/streamcore-raop-<active_remote_id>.fifo`.
    /// Fails loudly if `mkfifo` fails for any reason other than the path
    /// already existing from a crashed previous session (which is removed
    /// and recreated).
    pub fn create(active_remote_id: u32) -> AnyResult<Self> {
        let path = std::env::temp_dir().join(format!("streamcore-raop-{active_remote_id}.fifo"));
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let c_path = std::ffi::CString::new(path.to_string_lossy().as_bytes())
            .expect("temp path has no interior NUL");
        #[cfg(unix)]
        {
            let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
            if rc != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Writes one textual command line. Opens, writes, and closes on every
    /// call — the pipe is one-shot per command (spec §4.4).
    pub async fn send(&self, command: &str) -> AnyResult<()> {
        let mut file = OpenOptions::new().write(true).open(&self.path).await?;
        file.write_all(command.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

impl Drop for ControlFifo {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
