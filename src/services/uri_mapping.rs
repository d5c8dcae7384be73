//! Identity and location mapping between the two protocols.
//!
//! Pure functions: a legacy id plus optional file path becomes a native id
//! and location reference.

use url::Url;

use crate::domain::models::run::Location;
use crate::domain::models::test_item::ConverterId;

/// Legacy id reserved for the synthetic discovery-error node.
pub const DISCOVERY_ERROR_ID: &str = "@test-bridge:discovery-error";

/// Stable id of the converter serving `adapter_name` in `workspace_folder`.
pub fn converter_id(adapter_name: &str, workspace_folder: Option<&str>) -> ConverterId {
    match workspace_folder {
        Some(folder) => ConverterId::new(format!("{adapter_name}@{}", file_uri(folder))),
        None => ConverterId::new(adapter_name),
    }
}

/// Native id of a legacy node; unique across converters sharing a controller.
pub fn native_item_id(converter: &ConverterId, legacy_id: &str) -> String {
    format!("{converter}/{legacy_id}")
}

/// Convert a legacy `file` value to a URI.
///
/// Values that already parse as a URL pass through. Absolute host paths go
/// through [`Url::from_file_path`]; anything else (Windows paths on a POSIX
/// host, relative paths) is percent-encoded onto a `file:///` URL.
pub fn file_uri(file: &str) -> String {
    // A one-letter scheme is a drive letter.
    if let Ok(url) = Url::parse(file) {
        if url.scheme().len() > 1 {
            return url.into();
        }
    }
    if let Ok(url) = Url::from_file_path(file) {
        return url.into();
    }

    let mut path = file.replace('\\', "/");
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    match Url::parse("file:///") {
        Ok(mut url) => {
            url.set_path(&path);
            url.into()
        }
        Err(_) => format!("file://{path}"),
    }
}

/// Location of a legacy node. Without a file there is no location.
pub fn location(file: Option<&str>, line: Option<u32>) -> Option<Location> {
    file.map(|f| Location {
        uri: file_uri(f),
        line,
    })
}

/// Location of a message decoration.
///
/// The decoration's own file wins; otherwise the decoration line is anchored
/// in the node's declared source file.
pub fn decoration_location(
    file: Option<&str>,
    line: u32,
    fallback: Option<&Location>,
) -> Option<Location> {
    match file {
        Some(f) => Some(Location {
            uri: file_uri(f),
            line: Some(line),
        }),
        None => fallback.map(|loc| Location {
            uri: loc.uri.clone(),
            line: Some(line),
        }),
    }
}

/// Normalize line endings to `\r\n`, as terminal-style output expects.
pub fn normalize_output(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => out.push_str("\r\n"),
            _ => out.push(c),
        }
    }
    out
}
