//! Shared helpers for backup naming and on-disk identifier encoding.
//!
//! Every path the core writes under a backup directory uses the database's
//! own file-name escaping for identifiers, so that a restorer (or the
//! database itself) resolves the same paths.

use chrono::Utc;

/// Default backup name format: UTC time as `YYYY-MM-DDTHH-MM-SS`.
const BACKUP_NAME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Returns the default backup name for the current UTC time.
pub fn new_backup_name() -> String {
    Utc::now().format(BACKUP_NAME_FORMAT).to_string()
}

/// Strips every character outside `[A-Za-z0-9._-]` from a backup name.
///
/// Idempotent: sanitizing an already-sanitized name is a no-op.
pub fn sanitize_backup_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect()
}

/// Encodes a database identifier the way the database escapes it for
/// file names: ASCII alphanumerics and `_` pass through, every other
/// byte becomes `%XX` with uppercase hex digits.
pub fn table_path_encode(identifier: &str) -> String {
    let mut encoded = String::with_capacity(identifier.len());
    for byte in identifier.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push('%');
            encoded.push_str(&format!("{:02X}", byte));
        }
    }
    encoded
}

/// Formats a byte count for log output (binary units, one decimal).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
