//! Gzip pass over compiled static assets
//!
//! Every file under the static tree gains a `.gz` sibling so the web
//! server can serve precompressed assets. Existing siblings newer than
//! their source are kept.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Compress every file under `static_path` to a `.gz` sibling.
///
/// `.gz` files themselves are skipped, as are files whose sibling is
/// already newer. Returns the number of files compressed.
pub fn gzip_tree(static_path: &Path) -> io::Result<usize> {
    let mut compressed = 0;
    for entry in WalkDir::new(static_path).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            continue;
        }
        let mut gz_name = path.as_os_str().to_os_string();
        gz_name.push(".gz");
        let gz_path = Path::new(&gz_name);

        if let (Ok(gz_meta), Ok(src_meta)) = (gz_path.metadata(), path.metadata()) {
            if let (Ok(gz_mtime), Ok(src_mtime)) = (gz_meta.modified(), src_meta.modified()) {
                if gz_mtime > src_mtime {
                    continue;
                }
            }
        }

        let mut reader = BufReader::new(File::open(path)?);
        let mut encoder = GzEncoder::new(File::create(gz_path)?, Compression::best());
        io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?;
        debug!(path = %path.display(), "compressed");
        compressed += 1;
    }
    Ok(compressed)
}
