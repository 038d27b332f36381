//! Pure HTTP/1.0-shaped request parsing and path→action classification for
//! the DACP control server, spec §4.7. Kept free of I/O so the table is
//! unit-testable without a socket.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DacpRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub active_remote: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DacpAction {
    QueueNext,
    QueuePrevious,
    QueuePlay,
    QueuePlayPause,
    QueuePause,
    PlayerStop,
    VolumeUp,
    VolumeDown,
    ShuffleToggle,
    Unknown,
}

/// Parses the request line and headers of one HTTP/1.0-shaped request.
/// Returns `None` only if the request line itself cannot be split into a
/// method/target/version triple — spec §7 "ProtocolError: DACP parse
/// failure: log, drop connection".
pub fn parse_request(raw: &str) -> Option<DacpRequest> {
    let mut lines = raw.split("\r\n").flat_map(|l| l.split('\n'));
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let target = parts.next()?;
    let _version = parts.next();

    let (path, query) = match target.split_once('?') {
        Some((path, query_str)) => (path.to_string(), parse_query(query_str)),
        None => (target.to_string(), HashMap::new()),
    };

    let mut active_remote = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("active-remote") {
                active_remote = Some(value.trim().to_string());
            }
        }
    }

    Some(DacpRequest {
        path,
        query,
        active_remote,
    })
}

fn parse_query(query_str: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for pair in query_str.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key).map(|c| c.into_owned()).unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value).map(|c| c.into_owned()).unwrap_or_else(|_| value.to_string());
        out.insert(key, value);
    }
    out
}

pub fn classify_path(path: &str) -> DacpAction {
    match path {
        "/ctrl-int/1/nextitem" => DacpAction::QueueNext,
        "/ctrl-int/1/previtem" => DacpAction::QueuePrevious,
        "/ctrl-int/1/play" => DacpAction::QueuePlay,
        "/ctrl-int/1/playpause" => DacpAction::QueuePlayPause,
        "/ctrl-int/1/pause" | "/ctrl-int/1/discrete-pause" => DacpAction::QueuePause,
        "/ctrl-int/1/stop" => DacpAction::PlayerStop,
        "/ctrl-int/1/volumeup" => DacpAction::VolumeUp,
        "/ctrl-int/1/volumedown" => DacpAction::VolumeDown,
        "/ctrl-int/1/shuffle_songs" => DacpAction::ShuffleToggle,
        _ => DacpAction::Unknown,
    }
}

/// `[-30, 0] dB → [0, 100]`, spec §4.7 / SPEC_FULL §B.4.
pub fn remap_device_volume_db(db: f64) -> u8 {
    let clamped = db.clamp(-30.0, 0.0);
    (((clamped + 30.0) / 30.0) * 100.0).round() as u8
}

/// spec §4.7 / SPEC_FULL §B.4: only apply if the new value differs from the
/// current one by more than 2.
pub fn should_apply_volume(current: u8, proposed: u8) -> bool {
    (current as i32 - proposed as i32).abs() > 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_query_and_active_remote_header() {
        let raw = "GET /ctrl-int/1/nextitem?foo=bar HTTP/1.0\r\nActive-Remote: 4242\r\nHost: x\r\n\r\n";
        let req = parse_request(raw).unwrap();
        assert_eq!(req.path, "/ctrl-int/1/nextitem");
        assert_eq!(req.query.get("foo"), Some(&"bar".to_string()));
        assert_eq!(req.active_remote, Some("4242".to_string()));
    }

    #[test]
    fn classify_path_maps_known_paths() {
        assert_eq!(classify_path("/ctrl-int/1/playpause"), DacpAction::QueuePlayPause);
        assert_eq!(classify_path("/ctrl-int/1/discrete-pause"), DacpAction::QueuePause);
        assert_eq!(classify_path("/unknown/path"), DacpAction::Unknown);
    }

    #[test]
    fn device_volume_remap_clamps_to_range() {
        assert_eq!(remap_device_volume_db(0.0), 100);
        assert_eq!(remap_device_volume_db(-30.0), 0);
        assert_eq!(remap_device_volume_db(-15.0), 50);
        assert_eq!(remap_device_volume_db(10.0), 100);
        assert_eq!(remap_device_volume_db(-100.0), 0);
    }

    #[test]
    fn debounce_requires_more_than_two_units_of_difference() {
        assert!(!should_apply_volume(50, 52));
        assert!(should_apply_volume(50, 53));
        assert!(should_apply_volume(50, 47));
    }

    #[test]
    fn malformed_request_line_returns_none() {
        assert!(parse_request("").is_none());
    }
}
