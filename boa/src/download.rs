//! Writing retrieved products to disk.
//!
//! Bodies are streamed into a temporary file next to the destination and only
//! moved into place once the whole body has arrived, so a failed transfer
//! never leaves a partial file behind.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use log::info;
use regex::Regex;

use crate::error::{Error, Result};

/// Options for [`BoaClient::retrieve_data`](crate::BoaClient::retrieve_data).
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Request packets in binary (GDDS) rather than XML form.
    pub binary: bool,
    /// Directory that receives the downloaded file and its extracted members.
    pub directory: PathBuf,
    /// Unpack the downloaded tar archive.
    pub extract: bool,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            binary: true,
            directory: PathBuf::from("."),
            extract: true,
        }
    }
}

impl RetrieveOptions {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub fn binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    pub fn extract(mut self, extract: bool) -> Self {
        self.extract = extract;
        self
    }
}

/// Size of the chunks copied from the response body.
const CHUNK_SIZE: usize = 100_000;

/// Stream `body` into `destination`, returning the number of bytes written.
///
/// The data lands in a temporary file in the destination's directory and is
/// renamed over `destination` only after the copy succeeds. Failures reading
/// `body` go through `read_error`; failures writing are [`Error::Io`].
pub(crate) fn write_atomically(
    body: &mut impl Read,
    destination: &Path,
    read_error: impl Fn(std::io::Error) -> Error,
) -> Result<u64> {
    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".boa-download-")
        .tempfile_in(dir)
        .map_err(|e| Error::io(dir, e))?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_error(e)),
        };
        tmp.write_all(&buf[..n])
            .map_err(|e| Error::io(destination, e))?;
        written += n as u64;
    }

    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(destination, e))?;
    tmp.persist(destination)
        .map_err(|e| Error::io(destination, e.error))?;

    Ok(written)
}

/// File name from a `Content-Disposition` header value.
///
/// Handles `attachment; filename="x.tar"` and the unquoted form. Any
/// directory part is discarded so the name cannot escape the target directory.
pub(crate) fn filename_from_content_disposition(header: &str) -> Option<String> {
    static FILENAME: OnceLock<Regex> = OnceLock::new();
    let re = FILENAME.get_or_init(|| Regex::new(r"filename=(.+)").expect("valid regex"));

    let raw = re.captures(header)?.get(1)?.as_str();
    let raw = raw.split(';').next().unwrap_or(raw).trim().trim_matches('"');
    let name = Path::new(raw).file_name()?.to_str()?;

    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

/// Unpack a tar archive (optionally gzip-compressed) into `directory`.
///
/// Returns the paths of the extracted regular files, in archive order.
pub(crate) fn extract_archive(archive: &Path, directory: &Path) -> Result<Vec<PathBuf>> {
    let wrap = |source| Error::Archive {
        path: archive.to_path_buf(),
        source,
    };

    let mut file = File::open(archive).map_err(wrap)?;
    let mut magic = [0u8; 2];
    let gzipped = file.read_exact(&mut magic).is_ok() && magic == [0x1f, 0x8b];
    file.seek(SeekFrom::Start(0)).map_err(wrap)?;

    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut tar = tar::Archive::new(reader);
    let mut extracted = Vec::new();
    for entry in tar.entries().map_err(wrap)? {
        let mut entry = entry.map_err(wrap)?;
        let is_file = entry.header().entry_type().is_file();
        let relative = entry.path().map_err(wrap)?.into_owned();

        // unpack_in refuses paths that would land outside `directory`
        if entry.unpack_in(directory).map_err(wrap)? && is_file {
            extracted.push(directory.join(relative));
        }
    }

    info!(
        "extracted file(s): {}",
        extracted
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(extracted)
}
