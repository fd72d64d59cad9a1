//! Output destinations.
//!
//! A [`FileSink`] is where finished documents and archives go. A host either
//! hands bytes straight to the user ([`FileSink::deliver`], a download in a
//! browser) or asks for a location first and writes there.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::Result;

/// Destination for produced files.
pub trait FileSink {
    /// Hand `data` to the user under `filename`.
    fn deliver(&mut self, data: &[u8], filename: &str, mime: &str) -> Result<()>;

    /// Ask where to save a file suggested as `suggested`. `None` means the
    /// host has no save dialog or the user declined.
    fn pick_save_location(&mut self, suggested: &str) -> Option<PathBuf>;

    /// Write `data` to a location returned by [`FileSink::pick_save_location`].
    fn write_to(&mut self, path: &Path, data: &[u8]) -> Result<()>;

    /// Take back a file handed over by [`FileSink::deliver`].
    fn retract(&mut self, filename: &str) -> Result<()>;
}

/// Where [`save_or_deliver`] put a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Written(PathBuf),
    Delivered(String),
}

/// Save to a user-chosen location if the sink offers one, otherwise deliver.
pub fn save_or_deliver<S: FileSink + ?Sized>(
    sink: &mut S,
    data: &[u8],
    filename: &str,
    mime: &str,
) -> Result<Delivery> {
    match sink.pick_save_location(filename) {
        Some(path) => {
            sink.write_to(&path, data)?;
            Ok(Delivery::Written(path))
        }
        None => {
            sink.deliver(data, filename, mime)?;
            Ok(Delivery::Delivered(filename.to_string()))
        }
    }
}

/// Deliver every file or none of them.
///
/// When one delivery fails the files already handed over are retracted,
/// newest first, and the failure is returned.
pub fn deliver_batch<'a, S, I>(sink: &mut S, files: I, mime: &str) -> Result<Vec<Delivery>>
where
    S: FileSink + ?Sized,
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut delivered: Vec<&str> = Vec::new();
    for (filename, data) in files {
        if let Err(e) = sink.deliver(data, filename, mime) {
            for done in delivered.iter().rev() {
                if let Err(undo) = sink.retract(done) {
                    warn!("Could not retract {}: {}", done, undo);
                }
            }
            return Err(e);
        }
        delivered.push(filename);
    }
    Ok(delivered
        .into_iter()
        .map(|name| Delivery::Delivered(name.to_string()))
        .collect())
}

/// Sink that writes every delivered file into one directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    save_as: Option<PathBuf>,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            save_as: None,
            written: Vec::new(),
        }
    }

    /// Answer the next save prompt with `path` instead of delivering.
    pub fn with_save_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_as = Some(path.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every path written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write_file(&mut self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        info!("Wrote {} ({} bytes)", path.display(), data.len());
        self.written.push(path.to_path_buf());
        Ok(())
    }
}

impl FileSink for DirectorySink {
    fn deliver(&mut self, data: &[u8], filename: &str, mime: &str) -> Result<()> {
        debug!("Delivering {} as {}", filename, mime);
        let path = self.dir.join(filename);
        self.write_file(&path, data)
    }

    fn pick_save_location(&mut self, _suggested: &str) -> Option<PathBuf> {
        self.save_as.take()
    }

    fn write_to(&mut self, path: &Path, data: &[u8]) -> Result<()> {
        self.write_file(path, data)
    }

    fn retract(&mut self, filename: &str) -> Result<()> {
        let path = self.dir.join(filename);
        fs::remove_file(&path)?;
        self.written.retain(|p| *p != path);
        debug!("Removed {}", path.display());
        Ok(())
    }
}

/// A file captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredFile {
    pub filename: String,
    pub mime: String,
    pub data: Vec<u8>,
}

/// Sink that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub delivered: Vec<DeliveredFile>,
    pub written: Vec<(PathBuf, Vec<u8>)>,
    save_location: Option<PathBuf>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer `path` whenever a save location is requested.
    pub fn with_save_location(path: impl Into<PathBuf>) -> Self {
        Self {
            save_location: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn filenames(&self) -> Vec<&str> {
        self.delivered.iter().map(|f| f.filename.as_str()).collect()
    }
}

impl FileSink for MemorySink {
    fn deliver(&mut self, data: &[u8], filename: &str, mime: &str) -> Result<()> {
        self.delivered.push(DeliveredFile {
            filename: filename.to_string(),
            mime: mime.to_string(),
            data: data.to_vec(),
        });
        Ok(())
    }

    fn pick_save_location(&mut self, _suggested: &str) -> Option<PathBuf> {
        self.save_location.clone()
    }

    fn write_to(&mut self, path: &Path, data: &[u8]) -> Result<()> {
        self.written.push((path.to_path_buf(), data.to_vec()));
        Ok(())
    }

    fn retract(&mut self, filename: &str) -> Result<()> {
        if let Some(pos) = self.delivered.iter().rposition(|f| f.filename == filename) {
            self.delivered.remove(pos);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_save_or_deliver_falls_back_to_deliver() {
        let mut sink = MemorySink::new();
        let delivery = save_or_deliver(&mut sink, b"abc", "out.pdf", "application/pdf").unwrap();

        assert_eq!(delivery, Delivery::Delivered("out.pdf".to_string()));
        assert_eq!(sink.filenames(), vec!["out.pdf"]);
        assert!(sink.written.is_empty());
    }

    #[test]
    fn test_save_or_deliver_prefers_chosen_location() {
        let mut sink = MemorySink::with_save_location("/tmp/chosen.pdf");
        let delivery = save_or_deliver(&mut sink, b"abc", "out.pdf", "application/pdf").unwrap();

        assert_eq!(delivery, Delivery::Written(PathBuf::from("/tmp/chosen.pdf")));
        assert!(sink.delivered.is_empty());
        assert_eq!(sink.written[0].1, b"abc".to_vec());
    }

    #[test]
    fn test_directory_sink_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("nested"));

        sink.deliver(b"one", "a.pdf", "application/pdf").unwrap();
        sink.deliver(b"two", "b.pdf", "application/pdf").unwrap();

        assert_eq!(fs::read(dir.path().join("nested/a.pdf")).unwrap(), b"one");
        assert_eq!(fs::read(dir.path().join("nested/b.pdf")).unwrap(), b"two");
        assert_eq!(sink.written().len(), 2);
    }

    #[test]
    fn test_directory_sink_save_location_is_used_once() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("picked.pdf");
        let mut sink = DirectorySink::new(dir.path()).with_save_location(&target);

        let first = save_or_deliver(&mut sink, b"x", "a.pdf", "application/pdf").unwrap();
        let second = save_or_deliver(&mut sink, b"y", "b.pdf", "application/pdf").unwrap();

        assert_eq!(first, Delivery::Written(target.clone()));
        assert_eq!(second, Delivery::Delivered("b.pdf".to_string()));
        assert_eq!(fs::read(&target).unwrap(), b"x");
        assert_eq!(fs::read(dir.path().join("b.pdf")).unwrap(), b"y");
    }

    #[test]
    fn test_deliver_batch_delivers_in_order() {
        let mut sink = MemorySink::new();
        let files = [("a.pdf", &b"1"[..]), ("b.pdf", &b"2"[..])];
        let deliveries = deliver_batch(&mut sink, files, "application/pdf").unwrap();

        assert_eq!(
            deliveries,
            vec![
                Delivery::Delivered("a.pdf".to_string()),
                Delivery::Delivered("b.pdf".to_string())
            ]
        );
        assert_eq!(sink.filenames(), vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn test_deliver_batch_removes_written_files_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the second file should go makes its write fail.
        fs::create_dir(dir.path().join("b.pdf")).unwrap();
        let mut sink = DirectorySink::new(dir.path());

        let files = [("a.pdf", &b"1"[..]), ("b.pdf", &b"2"[..]), ("c.pdf", &b"3"[..])];
        assert!(deliver_batch(&mut sink, files, "application/pdf").is_err());

        assert!(!dir.path().join("a.pdf").exists());
        assert!(!dir.path().join("c.pdf").exists());
        assert!(sink.written().is_empty());
    }
}
