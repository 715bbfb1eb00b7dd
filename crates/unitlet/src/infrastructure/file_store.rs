//! [`UnitStore`] keeping unit files in one directory.

use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::domain::traits::until_cancelled;
use crate::domain::traits::StoreError;
use crate::domain::traits::UnitStore;
use crate::domain::units::Unit;
use crate::domain::units::UnitName;

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens the store, creating `dir` if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, Report<StoreError>> {
        let dir = dir.into();
        fs::DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(&dir)
            .await
            .change_context_lazy(|| StoreError::WriteFailed {
                location: dir.clone(),
            })
            .attach_printable("cannot create unit directory")?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn encode(&self, units: &[Unit]) -> Result<Vec<(PathBuf, Vec<u8>)>, Report<StoreError>> {
        units
            .iter()
            .map(|unit| {
                let name = unit.id.name();
                let data = unit.marshal().change_context_lazy(|| StoreError::Encode {
                    name: name.to_string(),
                })?;
                Ok((self.location(&name), data))
            })
            .collect()
    }
}

async fn write_file(
    location: &Path,
    data: &[u8],
    create_new: bool,
) -> Result<(), Report<StoreError>> {
    let mut options = fs::OpenOptions::new();
    options.write(true).mode(FILE_MODE);
    if create_new {
        options.create_new(true);
    } else {
        options.create(true).truncate(true);
    }

    let mut file = options.open(location).await.map_err(|e| {
        let context = if e.kind() == ErrorKind::AlreadyExists {
            StoreError::AlreadyExists {
                location: location.to_path_buf(),
            }
        } else {
            StoreError::WriteFailed {
                location: location.to_path_buf(),
            }
        };
        Report::new(e).change_context(context)
    })?;
    file.write_all(data)
        .await
        .change_context_lazy(|| StoreError::WriteFailed {
            location: location.to_path_buf(),
        })?;
    file.sync_all()
        .await
        .change_context_lazy(|| StoreError::WriteFailed {
            location: location.to_path_buf(),
        })
}

/// Removes files of a failed batch. Errors are logged, not returned.
async fn remove_written(locations: &[PathBuf]) {
    for location in locations {
        match fs::remove_file(location).await {
            Ok(()) => debug!(location = %location.display(), "unit file rolled back"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(location = %location.display(), error = %e, "failed to roll back unit file")
            }
        }
    }
}

#[async_trait]
impl UnitStore for FileStore {
    fn location(&self, name: &UnitName) -> PathBuf {
        self.dir.join(name.as_str())
    }

    async fn get_unit(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<Unit, Report<StoreError>> {
        let location = self.location(name);
        until_cancelled(cancel, StoreError::Cancelled, async {
            let data = fs::read(&location)
                .await
                .change_context_lazy(|| StoreError::ReadFailed {
                    location: location.clone(),
                })?;
            Unit::unmarshal(&data).change_context_lazy(|| StoreError::Decode {
                location: location.clone(),
            })
        })
        .await
    }

    async fn create_units(
        &self,
        units: &[Unit],
        cancel: &CancellationToken,
    ) -> Result<(), Report<StoreError>> {
        let files = self.encode(units)?;
        let mut written: Vec<PathBuf> = Vec::with_capacity(files.len());
        let result = until_cancelled(cancel, StoreError::Cancelled, async {
            for (location, _) in &files {
                let exists = fs::try_exists(location)
                    .await
                    .change_context_lazy(|| StoreError::ReadFailed {
                        location: location.clone(),
                    })?;
                if exists {
                    return Err(Report::new(StoreError::AlreadyExists {
                        location: location.clone(),
                    }));
                }
            }
            for (location, data) in &files {
                written.push(location.clone());
                if let Err(report) = write_file(location, data, true).await {
                    // the path belongs to someone else
                    if matches!(report.current_context(), StoreError::AlreadyExists { .. }) {
                        written.pop();
                    }
                    return Err(report);
                }
                debug!(location = %location.display(), "unit file created");
            }
            Ok(())
        })
        .await;

        if result.is_err() {
            remove_written(&written).await;
        }
        result
    }

    async fn delete_unit(
        &self,
        name: &UnitName,
        cancel: &CancellationToken,
    ) -> Result<(), Report<StoreError>> {
        let location = self.location(name);
        until_cancelled(cancel, StoreError::Cancelled, async {
            match fs::remove_file(&location).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Report::new(e).change_context(StoreError::DeleteFailed {
                    location: location.clone(),
                })),
            }
        })
        .await
    }

    async fn update_units(
        &self,
        units: &[Unit],
        cancel: &CancellationToken,
    ) -> Result<(), Report<StoreError>> {
        let files = self.encode(units)?;
        until_cancelled(cancel, StoreError::Cancelled, async {
            for (location, data) in &files {
                write_file(location, data, false).await?;
            }
            Ok(())
        })
        .await
    }
}
