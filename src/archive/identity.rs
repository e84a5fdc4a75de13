//! Content identity derivation
//!
//! Derives the cache validator (`ETag`) and `Content-Type` of an archive entry
//! from its name and stored modification time. Nothing here reads entry bytes.

use crate::http::mime;
use chrono::NaiveDate;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zip::extra_fields::ExtraField;

/// Validator and content type of one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentIdentity {
    pub etag: String,
    pub content_type: &'static str,
}

/// Derive the identity of an entry named `entry_name` modified at `modified`
///
/// `modified` is expected to be truncated to whole seconds already; see
/// [`truncate_to_seconds`].
pub fn derive_identity(entry_name: &str, modified: SystemTime) -> ContentIdentity {
    ContentIdentity {
        etag: make_etag(modified),
        content_type: content_type_from_name(entry_name),
    }
}

/// Build a quoted `ETag` from the Unix seconds of `modified`
///
/// The seconds are written as 8 little-endian bytes and hex encoded, e.g. the
/// epoch becomes `"0000000000000000"`.
pub fn make_etag(modified: SystemTime) -> String {
    let seconds = unix_seconds(modified);
    let hex: String = seconds
        .to_le_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("\"{hex}\"")
}

/// Guess the content type from the file extension of `name`
pub fn content_type_from_name(name: &str) -> &'static str {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    mime::get_content_type(extension.as_deref())
}

/// Drop sub-second precision from `time`
pub fn truncate_to_seconds(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => UNIX_EPOCH + Duration::from_secs(since.as_secs()),
        // Pre-epoch times round towards negative infinity.
        Err(e) => {
            let before = e.duration();
            let mut secs = before.as_secs();
            if before.subsec_nanos() > 0 {
                secs += 1;
            }
            UNIX_EPOCH - Duration::from_secs(secs)
        }
    }
}

/// Signed Unix seconds of `time`
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_secs()).unwrap_or(i64::MAX),
        Err(e) => i64::try_from(e.duration().as_secs()).map_or(i64::MIN, |s| -s),
    }
}

/// Modification time of a zip entry
///
/// Prefers the extended timestamp extra field, which is UTC by definition, and
/// falls back to the MS-DOS date/time read as UTC. Entries without any usable
/// timestamp report the Unix epoch.
pub fn entry_modified_time<'a>(
    extended_mtime: impl IntoIterator<Item = &'a ExtraField>,
    dos_time: Option<zip::DateTime>,
) -> SystemTime {
    let extended = extended_mtime.into_iter().find_map(|field| match field {
        ExtraField::ExtendedTimestamp(ts) => ts.mod_time(),
        _ => None,
    });
    if let Some(seconds) = extended {
        return UNIX_EPOCH + Duration::from_secs(u64::from(seconds));
    }
    dos_time.and_then(dos_to_system_time).unwrap_or(UNIX_EPOCH)
}

fn dos_to_system_time(dt: zip::DateTime) -> Option<SystemTime> {
    let naive = NaiveDate::from_ymd_opt(
        i32::from(dt.year()),
        u32::from(dt.month()),
        u32::from(dt.day()),
    )?
    .and_hms_opt(
        u32::from(dt.hour()),
        u32::from(dt.minute()),
        u32::from(dt.second()),
    )?;
    let seconds = naive.and_utc().timestamp();
    u64::try_from(seconds)
        .ok()
        .map(|s| UNIX_EPOCH + Duration::from_secs(s))
}
