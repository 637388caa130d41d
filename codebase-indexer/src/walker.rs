use crate::error::Result;
use ignore::WalkBuilder;
use log::debug;
use sidekick_protocol::{FileStats, FileStatsEntry};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Files above this size are excluded from indexing entirely.
pub const MAX_INDEXABLE_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Canonicalize a workspace URI for comparison: strip the `file://` scheme,
/// percent-decode, and normalize separators. The IDE and the walker must
/// agree on this form or refresh-file filters silently match nothing.
pub fn canonical_uri(uri: &str) -> String {
    let stripped = uri.strip_prefix("file://").unwrap_or(uri);
    percent_decode(stripped).replace('\\', "/")
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = &input[i + 1..i + 3];
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

/// Walk one workspace root and snapshot stats for every candidate file.
/// Honors `.gitignore`; oversized files are excluded here so no later stage
/// ever sees them.
pub fn walk_dir_stats(dir: &str) -> Result<FileStats> {
    let root = canonical_uri(dir);
    let mut stats = FileStats::new();

    let walk = WalkBuilder::new(Path::new(&root))
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .require_git(false)
        .build();

    for entry in walk {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Skipping {}: {e}", path.display());
                continue;
            }
        };
        if metadata.len() > MAX_INDEXABLE_FILE_SIZE {
            debug!("Skipping {}: exceeds size cap", path.display());
            continue;
        }

        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        stats.insert(
            canonical_uri(&path.to_string_lossy()),
            FileStatsEntry {
                last_modified,
                size: metadata.len(),
            },
        );
    }

    debug!("Walked {root}: {} candidate files", stats.len());
    Ok(stats)
}
