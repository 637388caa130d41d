use once_cell::sync::Lazy;
use regex::Regex;

/// Errors that mean the storage is transiently busy. These are matched
/// before the clear set and never trigger an index rebuild; the 3 s busy
/// timeout retries them.
static BUSY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[r"(?i)database( table)? is locked", r"(?i)SQLITE_BUSY"])
});

/// Errors that indicate structural damage or an unrecoverable mismatch
/// between the stores. The list is static and not user-configurable.
static CLEAR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        // Vector store dimension drift, e.g. after an embedding model change.
        r"(?i)query vector (of )?(dim(ension)?|length) \d+ does not match",
        r"(?i)vector length mismatch",
        // SQLite failure families.
        r"(?i)SQLITE_CONSTRAINT",
        r"(?i)UNIQUE constraint failed",
        r"(?i)SQLITE_CORRUPT",
        r"(?i)database disk image is malformed",
        r"(?i)SQLITE_IOERR",
        r"(?i)disk I/O error",
        r"(?i)SQLITE_FULL",
        r"(?i)database or disk is full",
        r"(?i)SQLITE_ERROR",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid static pattern {p:?}: {e}")))
        .collect()
}

/// Whether an error message signals that the indexes are beyond repair and
/// should be cleared and rebuilt. Busy errors are excluded first.
pub fn should_clear_indexes(error_text: &str) -> bool {
    if BUSY_PATTERNS.iter().any(|re| re.is_match(error_text)) {
        return false;
    }
    CLEAR_PATTERNS.iter().any(|re| re.is_match(error_text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_errors_never_clear() {
        assert!(!should_clear_indexes("database is locked"));
        assert!(!should_clear_indexes("database table is locked"));
        assert!(!should_clear_indexes("SQLITE_BUSY: database is locked"));
    }

    #[test]
    fn structural_errors_clear() {
        assert!(should_clear_indexes("UNIQUE constraint failed: tag_catalog.dir"));
        assert!(should_clear_indexes("database disk image is malformed"));
        assert!(should_clear_indexes("disk I/O error"));
        assert!(should_clear_indexes("database or disk is full"));
        assert!(should_clear_indexes(
            "query vector of dimension 384 does not match index column of dimension 768"
        ));
        assert!(should_clear_indexes("vector length mismatch"));
    }

    #[test]
    fn unrelated_errors_do_not_clear() {
        assert!(!should_clear_indexes("connection refused"));
        assert!(!should_clear_indexes("model stream ended unexpectedly"));
        assert!(!should_clear_indexes(""));
    }
}
