//! Persists rendered output and removes it again. Writing creates any missing
//! parent directories; deleting cleans up directories left empty, stopping at
//! the output root.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::paths::{self, PathMapper};

/// Writes and deletes output files for source documents.
#[derive(Debug, Clone)]
pub struct Writer {
    /// Maps source paths to output paths.
    pub mapper: PathMapper,

    /// The site directory static files are copied from. Their first directory
    /// under this root is dropped: `site/assets/css/a.css` is copied to
    /// `{output}/css/a.css`.
    pub site_root: PathBuf,
}

impl Writer {
    pub fn new(mapper: PathMapper, site_root: &Path) -> Writer {
        Writer {
            mapper,
            site_root: site_root.to_owned(),
        }
    }

    fn output_root(&self) -> &Path {
        &self.mapper.output_root
    }

    /// Writes `text` to the output path for `source` and returns that path.
    pub async fn write(&self, text: &str, source: &Path) -> Result<PathBuf> {
        let target = self.mapper.map(source)?;
        self.write_to(text, &target).await
    }

    /// Writes `text` to `target`, creating parent directories as needed.
    pub async fn write_to(&self, text: &str, target: &Path) -> Result<PathBuf> {
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|err| Error::CreateDir {
                    path: dir.to_owned(),
                    err,
                })?;
        }
        tokio::fs::write(target, text)
            .await
            .map_err(|err| Error::Write {
                path: target.to_owned(),
                err,
            })?;
        tracing::info!("File built: {}", self.relative(target).display());
        Ok(target.to_owned())
    }

    /// Deletes the output file for `source` and any directories left empty.
    /// A missing output file is an error.
    pub async fn delete(&self, source: &Path) -> Result<PathBuf> {
        let target = self.mapper.map(source)?;
        self.remove(&target).await?;
        tracing::info!("File removed: {}", self.relative(&target).display());
        Ok(target)
    }

    /// Copies a static file from the site directory into the output
    /// directory. See [`Writer::site_root`] for where it lands.
    pub async fn copy_static(&self, file: &Path) -> Result<PathBuf> {
        let target = self.static_target(file)?;
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|err| Error::CreateDir {
                    path: dir.to_owned(),
                    err,
                })?;
        }
        tokio::fs::copy(file, &target)
            .await
            .map_err(|err| Error::Copy {
                path: file.to_owned(),
                err,
            })?;
        tracing::info!("File copied: {}", self.relative(&target).display());
        Ok(target)
    }

    /// Deletes the output copy of a static file and any directories left
    /// empty.
    pub async fn delete_static(&self, file: &Path) -> Result<PathBuf> {
        let target = self.static_target(file)?;
        self.remove(&target).await?;
        tracing::info!("File removed: {}", self.relative(&target).display());
        Ok(target)
    }

    /// Returns the output path for a static file.
    pub fn static_target(&self, file: &Path) -> Result<PathBuf> {
        let relative = file
            .strip_prefix(&self.site_root)
            .map_err(|_| Error::OutsideSiteRoot(file.to_owned()))?;
        let mut components = relative.components().filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        });
        // drop the first folder
        components.next();
        let rest: PathBuf = components.collect();
        if rest.as_os_str().is_empty() {
            return Err(Error::OutsideSiteRoot(file.to_owned()));
        }
        Ok(self.output_root().join(rest))
    }

    async fn remove(&self, target: &Path) -> Result<()> {
        tokio::fs::remove_file(target)
            .await
            .map_err(|err| Error::Delete {
                path: target.to_owned(),
                err,
            })?;
        if let Some(dir) = target.parent() {
            vacuum(dir, self.output_root()).await?;
        }
        Ok(())
    }

    // Paths are logged relative to the output root.
    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(self.output_root()).unwrap_or(path)
    }
}

/// Removes empty directories from `start` upward, stopping at the first
/// non-empty directory or at `boundary`, which is never removed. Directories
/// outside `boundary` are left alone.
pub async fn vacuum(start: &Path, boundary: &Path) -> Result<()> {
    let mut dir = start;
    while dir != boundary && dir.starts_with(boundary) {
        match tokio::fs::read_dir(dir).await {
            Ok(mut entries) => {
                let next = entries.next_entry().await.map_err(|err| Error::Vacuum {
                    path: dir.to_owned(),
                    err,
                })?;
                if next.is_some() {
                    break;
                }
                tokio::fs::remove_dir(dir)
                    .await
                    .map_err(|err| Error::Vacuum {
                        path: dir.to_owned(),
                        err,
                    })?;
                tracing::debug!("removed empty directory {}", dir.display());
            }
            // Already gone; keep going up.
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(Error::Vacuum {
                    path: dir.to_owned(),
                    err,
                })
            }
        }
        dir = match dir.parent() {
            Some(parent) => parent,
            None => break,
        };
    }
    Ok(())
}

/// The result of a writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error writing or deleting output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the output path can't be derived.
    #[error(transparent)]
    Path(#[from] paths::Error),

    /// Returned when an output directory can't be created.
    #[error("creating directory `{}`: {err}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    /// Returned when an output file can't be written.
    #[error("writing `{}`: {err}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    /// Returned when a static file can't be copied.
    #[error("copying `{}`: {err}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    /// Returned when an output file can't be deleted, including when it
    /// doesn't exist.
    #[error("deleting `{}`: {err}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    /// Returned when cleaning up empty directories fails.
    #[error("removing empty directory `{}`: {err}", path.display())]
    Vacuum {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    /// Returned when a static file isn't below a folder in the site
    /// directory.
    #[error("static file `{}` is not inside a site subdirectory", .0.display())]
    OutsideSiteRoot(PathBuf),
}
