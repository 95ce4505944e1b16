//! Archive fetch boundary.
//!
//! The decoder only needs one byte buffer per archive; where the bytes come
//! from is up to an [`ArchiveSource`]. [`DirSource`] reads them from a local
//! directory, transparently inflating `.gz` files.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::{Error, Result};

/// The four archives of an MNIST-style corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    TrainImages,
    TrainLabels,
    TestImages,
    TestLabels,
}

impl ArchiveKind {
    pub const ALL: [ArchiveKind; 4] = [
        ArchiveKind::TrainImages,
        ArchiveKind::TrainLabels,
        ArchiveKind::TestImages,
        ArchiveKind::TestLabels,
    ];

    /// Accepted file names, in lookup order.
    pub fn file_names(self) -> [&'static str; 2] {
        match self {
            ArchiveKind::TrainImages => ["train-images.idx3-ubyte", "train-images-idx3-ubyte"],
            ArchiveKind::TrainLabels => ["train-labels.idx1-ubyte", "train-labels-idx1-ubyte"],
            ArchiveKind::TestImages => ["t10k-images.idx3-ubyte", "t10k-images-idx3-ubyte"],
            ArchiveKind::TestLabels => ["t10k-labels.idx1-ubyte", "t10k-labels-idx1-ubyte"],
        }
    }

    pub fn is_images(self) -> bool {
        matches!(self, ArchiveKind::TrainImages | ArchiveKind::TestImages)
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveKind::TrainImages => "train-images",
            ArchiveKind::TrainLabels => "train-labels",
            ArchiveKind::TestImages => "test-images",
            ArchiveKind::TestLabels => "test-labels",
        };
        f.write_str(name)
    }
}

/// Supplies the raw bytes of an archive.
pub trait ArchiveSource {
    fn fetch(&self, kind: ArchiveKind) -> Result<Vec<u8>>;
}

/// Reads archives from a directory.
///
/// For each accepted file name, `<name>` is tried first, then `<name>.gz`.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// First existing path for `kind`, if any.
    pub fn locate(&self, kind: ArchiveKind) -> Option<PathBuf> {
        kind.file_names()
            .iter()
            .flat_map(|name| [self.root.join(name), self.root.join(format!("{name}.gz"))])
            .find(|p| p.is_file())
    }
}

impl ArchiveSource for DirSource {
    fn fetch(&self, kind: ArchiveKind) -> Result<Vec<u8>> {
        let path = self.locate(kind).ok_or_else(|| {
            Error::io(
                self.root.join(kind.file_names()[0]),
                std::io::Error::new(std::io::ErrorKind::NotFound, format!("no {kind} archive")),
            )
        })?;

        let file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let gz = path.extension().is_some_and(|ext| ext == "gz");
        let mut reader: Box<dyn Read> = if gz {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| Error::io(&path, e))?;
        log::info!("fetched {kind} ({} bytes) from {}", buf.len(), path.display());
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn reads_plain_and_gzipped_archives() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("train-images.idx3-ubyte"), [1, 2, 3]).unwrap();

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&[4, 5]).unwrap();
        std::fs::write(
            dir.path().join("t10k-labels-idx1-ubyte.gz"),
            enc.finish().unwrap(),
        )
        .unwrap();

        let source = DirSource::new(dir.path());
        assert_eq!(source.fetch(ArchiveKind::TrainImages).unwrap(), vec![1, 2, 3]);
        assert_eq!(source.fetch(ArchiveKind::TestLabels).unwrap(), vec![4, 5]);
    }

    #[test]
    fn missing_archive_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirSource::new(dir.path())
            .fetch(ArchiveKind::TrainLabels)
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("train-labels.idx1-ubyte"));
    }
}
