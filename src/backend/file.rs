//! Stores results as newline-delimited JSON in a file, appending to any
//! existing content.

use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::Path,
};

use super::{BackendError, DataBackend, StoredResult};

pub struct FileDataBackend {
    writer: BufWriter<File>,
}

impl FileDataBackend {
    /// Opens (creating if necessary) `path` for appending. Existing content
    /// is preserved; new results are written after it.
    pub fn new(path: &Path) -> Result<Self, BackendError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .write(true)
            .open(path)?;

        Ok(Self { writer: BufWriter::new(file) })
    }
}

impl DataBackend for FileDataBackend {
    fn store(&mut self, result: &StoredResult) -> Result<(), BackendError> {
        serde_json::to_writer(&mut self.writer, result)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{io::BufRead, time::Duration};

    use super::*;

    #[test]
    fn stores_results_as_newline_delimited_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        let mut backend = FileDataBackend::new(&path).unwrap();
        backend
            .store(&StoredResult {
                url: "http://a".into(),
                http_status_code: 200,
                http_status_message: "OK".into(),
                ttfb: Duration::from_millis(42),
                cached: false,
            })
            .unwrap();
        backend
            .store(&StoredResult {
                url: "http://b".into(),
                http_status_code: 404,
                http_status_message: "Not Found".into(),
                ttfb: Duration::from_millis(7),
                cached: true,
            })
            .unwrap();
        backend.close().unwrap();

        let contents = std::fs::read(&path).unwrap();
        let lines: Vec<_> = contents.lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["url"], "http://a");
        assert_eq!(first["httpstatuscode"], 200);
        assert_eq!(first["ttfb"], 42_000_000);
        assert_eq!(first["cached"], false);
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        let mut backend = FileDataBackend::new(&path).unwrap();
        backend
            .store(&StoredResult {
                url: "http://a".into(),
                http_status_code: 200,
                http_status_message: "OK".into(),
                ttfb: Duration::from_millis(1),
                cached: false,
            })
            .unwrap();
        backend.close().unwrap();

        let mut backend = FileDataBackend::new(&path).unwrap();
        backend
            .store(&StoredResult {
                url: "http://b".into(),
                http_status_code: 200,
                http_status_message: "OK".into(),
                ttfb: Duration::from_millis(1),
                cached: false,
            })
            .unwrap();
        backend.close().unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
