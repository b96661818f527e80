use crate::foundation::error::{VtxError, VtxResult};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// A file written under a temporary name next to its destination and renamed into place on
/// [`AtomicFile::commit`]. Dropping it uncommitted removes the temporary file.
pub struct AtomicFile {
    dest: PathBuf,
    writer: BufWriter<File>,
    tmp: TempFileGuard,
}

impl AtomicFile {
    /// Open a temporary file for `dest`. Fails when `dest` exists and `overwrite` is off.
    pub fn create(dest: impl AsRef<Path>, overwrite: bool) -> VtxResult<Self> {
        let dest = dest.as_ref().to_path_buf();
        if !overwrite && dest.exists() {
            return Err(VtxError::validation(format!(
                "output '{}' already exists",
                dest.display()
            )));
        }
        let file_name = dest.file_name().ok_or_else(|| {
            VtxError::validation(format!("output '{}' has no file name", dest.display()))
        })?;
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let tmp_path = dest.with_file_name(format!(
            ".{}.{}-{nanos}.tmp",
            file_name.to_string_lossy(),
            std::process::id()
        ));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .map_err(|e| {
                VtxError::Other(anyhow::anyhow!(e).context(format!(
                    "create temporary file '{}'",
                    tmp_path.display()
                )))
            })?;

        Ok(Self {
            dest,
            writer: BufWriter::new(file),
            tmp: TempFileGuard(Some(tmp_path)),
        })
    }

    /// Final destination.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Flush, sync and rename into place.
    pub fn commit(self) -> VtxResult<PathBuf> {
        let Self {
            dest,
            writer,
            mut tmp,
        } = self;
        let file = writer
            .into_inner()
            .map_err(|e| io_error(e.into_error(), &dest))?;
        file.sync_all().map_err(|e| io_error(e, &dest))?;
        drop(file);

        if let Some(tmp_path) = &tmp.0 {
            std::fs::rename(tmp_path, &dest).map_err(|e| io_error(e, &dest))?;
        }
        tmp.0 = None;
        Ok(dest)
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

pub(crate) fn io_error(e: std::io::Error, path: &Path) -> VtxError {
    VtxError::Other(anyhow::anyhow!(e).context(format!("write '{}'", path.display())))
}
