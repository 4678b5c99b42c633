//! Small file helpers used by file parts and response export.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use bytes::Bytes;

/// Read a whole file.
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be read.
pub fn read_bytes(path: impl AsRef<Path>) -> io::Result<Bytes> {
    fs::read(path).map(Bytes::from)
}

/// Write `data` to `path`, creating missing parent directories.
///
/// With `append` the data is added at the end of an existing file, otherwise
/// the file is truncated first.
///
/// # Errors
///
/// Returns the underlying I/O error if a directory or the file cannot be
/// created or written.
pub fn write_bytes(path: impl AsRef<Path>, data: &[u8], append: bool) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    file.write_all(data)?;
    file.flush()
}

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Human readable size, e.g. `"1.50 KB"`, `"1 byte"`, `"512 bytes"`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let scaled = |unit: u64| bytes as f64 / unit as f64;
    match bytes {
        b if b >= GB => format!("{:.2} GB", scaled(GB)),
        b if b >= MB => format!("{:.2} MB", scaled(MB)),
        b if b >= KB => format!("{:.2} KB", scaled(KB)),
        1 => "1 byte".to_owned(),
        b => format!("{b} bytes"),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_write_truncates_or_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/out.txt");

        write_bytes(&path, b"first", false).unwrap();
        write_bytes(&path, b"+second", true).unwrap();
        assert_eq!(read_bytes(&path).unwrap().as_ref(), b"first+second");

        write_bytes(&path, b"fresh", false).unwrap();
        assert_eq!(read_bytes(&path).unwrap().as_ref(), b"fresh");
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_bytes(dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 bytes");
        assert_eq!(format_bytes(1), "1 byte");
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * MB), "5.00 MB");
        assert_eq!(format_bytes(3 * GB + GB / 4), "3.25 GB");
    }
}
