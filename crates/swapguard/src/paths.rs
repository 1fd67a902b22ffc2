use directories::ProjectDirs;
use eyre::{Context as _, ContextCompat as _};
use serde::Serialize;
use std::{
    fs::{self, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt as _, PermissionsExt as _};

const LOG_FILE_NAME: &str = "swapguard.log.jsonl";
const MODE_DIR_PRIVATE: u32 = 0o700;
const MODE_FILE_PRIVATE: u32 = 0o600;

#[derive(Debug, Clone, Serialize)]
pub struct SwapguardPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
    pub log_file: PathBuf,
}

impl SwapguardPaths {
    fn from_dirs(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_file: config_dir.join("config.toml"),
            log_file: data_dir.join(LOG_FILE_NAME),
            config_dir,
            data_dir,
        }
    }

    pub fn discover() -> eyre::Result<Self> {
        // Test/CI override knobs.
        if let (Ok(data_dir), Ok(config_dir)) = (
            std::env::var("SWAPGUARD_DATA_DIR"),
            std::env::var("SWAPGUARD_CONFIG_DIR"),
        ) {
            return Ok(Self::from_dirs(
                PathBuf::from(config_dir),
                PathBuf::from(data_dir),
            ));
        }

        // macOS: ~/Library/Application Support/swapguard
        // Linux: ~/.config/swapguard and ~/.local/share/swapguard
        let proj =
            ProjectDirs::from("", "", "swapguard").context("failed to resolve project dirs")?;
        Ok(Self::from_dirs(
            proj.config_dir().to_path_buf(),
            proj.data_dir().to_path_buf(),
        ))
    }

    pub fn ensure_private_dirs(&self) -> eyre::Result<()> {
        ensure_private_dir(&self.config_dir)?;
        ensure_private_dir(&self.data_dir)
    }

    /// Write `contents` as the config file unless one already exists. Returns whether it wrote.
    pub fn write_config_if_missing(&self, contents: &str) -> eyre::Result<bool> {
        if self.config_file.exists() {
            return Ok(false);
        }
        write_atomic_private(&self.config_file, contents.as_bytes())?;
        Ok(true)
    }
}

fn ensure_private_dir(dir: &Path) -> eyre::Result<()> {
    if dir.exists() {
        let md = fs::symlink_metadata(dir).with_context(|| format!("stat {}", dir.display()))?;
        if md.file_type().is_symlink() {
            eyre::bail!("refusing to use symlinked directory: {}", dir.display());
        }
        if !md.is_dir() {
            eyre::bail!("expected directory at {}", dir.display());
        }
    } else {
        fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    }

    #[cfg(unix)]
    {
        let mode = fs::metadata(dir)
            .with_context(|| format!("stat {}", dir.display()))?
            .permissions()
            .mode();
        if (mode & 0o077) != 0 {
            fs::set_permissions(dir, fs::Permissions::from_mode(MODE_DIR_PRIVATE))
                .with_context(|| format!("chmod {MODE_DIR_PRIVATE:o} {}", dir.display()))?;
        }
    }
    Ok(())
}

/// Temp file plus rename, so a crash never leaves a half-written config behind.
fn write_atomic_private(path: &Path, bytes: &[u8]) -> eyre::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| eyre::eyre!("missing parent for {}", path.display()))?;
    ensure_private_dir(parent)?;

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let tmp = parent.join(format!(".{name}.tmp.{:016x}", rand::random::<u64>()));

    let mut oo = OpenOptions::new();
    oo.create_new(true).write(true);
    #[cfg(unix)]
    {
        oo.mode(MODE_FILE_PRIVATE);
    }
    let mut f = oo
        .open(&tmp)
        .with_context(|| format!("open temp {}", tmp.display()))?;
    f.write_all(bytes)
        .with_context(|| format!("write {}", tmp.display()))?;
    f.sync_all()
        .with_context(|| format!("fsync {}", tmp.display()))?;
    drop(f);

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))
}
