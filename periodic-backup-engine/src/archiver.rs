//! Archive producer and extractor
//!
//! The engine only needs "turn the configured sources into archive files" and
//! "unpack these archive files into the live directories". `TarZstdArchiver`
//! is the default implementation: one zstd-compressed tarball per source
//! directory, named `<base>_<NN>.tar.zst`.

use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use periodic_backup_core::{FileManagerConfig, PeriodicBackupError, Result};

pub const ARCHIVE_EXTENSION: &str = ".tar.zst";

#[async_trait]
pub trait Archiver: Send + Sync + std::fmt::Debug {
    /// Identifier recorded in every manifest this archiver produces
    fn id(&self) -> &str;

    /// Produce the archives of one run inside `scratch`. Every file name must
    /// start with `base`.
    async fn archive(&self, base: &str, scratch: &Path) -> Result<Vec<PathBuf>>;

    /// Unpack previously produced archives into their target directories.
    async fn extract(&self, archives: &[PathBuf]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct TarZstdArchiver {
    sources: Vec<PathBuf>,
    targets: Vec<PathBuf>,
    level: i32,
}

impl TarZstdArchiver {
    pub const ID: &'static str = "tar-zstd";

    pub fn new(sources: Vec<PathBuf>, targets: Vec<PathBuf>, level: i32) -> Self {
        Self {
            sources,
            targets,
            level,
        }
    }

    pub fn from_config(config: &FileManagerConfig) -> Self {
        Self::new(
            config.sources.clone(),
            config.targets().to_vec(),
            config.compression_level,
        )
    }

    pub fn archive_name(base: &str, index: usize) -> String {
        format!("{}_{:02}{}", base, index, ARCHIVE_EXTENSION)
    }

    /// Recover the source index from an archive file name.
    pub fn archive_index(name: &str) -> Option<usize> {
        name.strip_suffix(ARCHIVE_EXTENSION)?
            .rsplit('_')
            .next()?
            .parse()
            .ok()
    }
}

fn pack_directory(source: &Path, destination: &Path, level: i32) -> Result<()> {
    if !source.is_dir() {
        return Err(PeriodicBackupError::Archive(format!(
            "Backup source {} is not a directory",
            source.display()
        )));
    }

    let file = File::create(destination)?;
    let encoder = zstd::Encoder::new(file, level)?;
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", source)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

fn unpack_archive(archive: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target)?;
    let decoder = zstd::Decoder::new(File::open(archive)?)?;
    let mut tarball = tar::Archive::new(decoder);
    tarball.set_preserve_permissions(true);
    tarball.unpack(target)?;
    Ok(())
}

#[async_trait]
impl Archiver for TarZstdArchiver {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn archive(&self, base: &str, scratch: &Path) -> Result<Vec<PathBuf>> {
        let mut archives = Vec::with_capacity(self.sources.len());

        for (index, source) in self.sources.iter().enumerate() {
            let destination = scratch.join(Self::archive_name(base, index));
            let source = source.clone();
            let output = destination.clone();
            let level = self.level;

            tokio::task::spawn_blocking(move || pack_directory(&source, &output, level)).await??;

            debug!("Archived {} into {}", self.sources[index].display(), destination.display());
            archives.push(destination);
        }

        info!("Created {} archive(s) for {}", archives.len(), base);
        Ok(archives)
    }

    async fn extract(&self, archives: &[PathBuf]) -> Result<()> {
        for archive in archives {
            let name = archive
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let target = Self::archive_index(name)
                .and_then(|index| self.targets.get(index))
                .ok_or_else(|| {
                    PeriodicBackupError::Archive(format!(
                        "No restore target configured for archive {}",
                        name
                    ))
                })?
                .clone();

            let source = archive.clone();
            let destination = target.clone();
            tokio::task::spawn_blocking(move || unpack_archive(&source, &destination)).await??;
            info!("Extracted {} into {}", name, target.display());
        }
        Ok(())
    }
}
