//! Result sink shared by all workers.

use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use xtag_record::Attribute;

/// Serializes writes from concurrent file operations.
pub struct Printer {
    out: Mutex<Box<dyn Write + Send>>,
}

#[derive(Serialize)]
struct RecordDump<'a> {
    path: &'a str,
    records: &'a Attribute,
}

impl Printer {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `path` followed by a newline.
    pub fn line(&self, path: &Path) -> io::Result<()> {
        let mut out = self.lock();
        write_path(&mut *out, path)?;
        out.write_all(b"\n")
    }

    /// `path` followed by a NUL byte.
    pub fn null(&self, path: &Path) -> io::Result<()> {
        let mut out = self.lock();
        write_path(&mut *out, path)?;
        out.write_all(b"\0")
    }

    /// Pretty JSON `{"path": ..., "records": {...}}` followed by a newline.
    pub fn records(&self, path: &Path, attr: &Attribute) -> io::Result<()> {
        let path = path.to_string_lossy();
        let dump = RecordDump {
            path: &path,
            records: attr,
        };
        let mut payload = serde_json::to_vec_pretty(&dump)?;
        payload.push(b'\n');
        self.lock().write_all(&payload)
    }

    pub fn flush(&self) -> io::Result<()> {
        self.lock().flush()
    }
}

#[cfg(unix)]
fn write_path(out: &mut dyn Write, path: &Path) -> io::Result<()> {
    use std::os::unix::ffi::OsStrExt;
    out.write_all(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn write_path(out: &mut dyn Write, path: &Path) -> io::Result<()> {
    out.write_all(path.to_string_lossy().as_bytes())
}

/// In-memory writer whose contents stay readable after being handed to a
/// [`Printer`].
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
