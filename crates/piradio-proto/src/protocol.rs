//! Player control bytes and the status lines the player prints.
//!
//! The player is driven through single ASCII bytes on its stdin and reports
//! progress as newline-terminated text on stdout. Only a handful of line
//! shapes carry information for the display; everything else is ignored so
//! that unknown output from newer player versions is harmless.

/// A transport command written as one byte to the player's stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    VolumeUp,
    VolumeDown,
    ToggleMute,
    Quit,
}

impl Transport {
    pub fn byte(self) -> u8 {
        match self {
            Transport::VolumeUp => b'*',
            Transport::VolumeDown => b'/',
            Transport::ToggleMute => b'm',
            Transport::Quit => b'q',
        }
    }
}

/// One decoded piece of player status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Stream name announced by the server.
    StationName(String),
    /// Raw `StreamTitle` from ICY metadata.
    Title(String),
    Bitrate(String),
    /// Volume level as printed, without the percent sign.
    Volume(String),
    Mute(bool),
    /// The player's output ended (process exited).
    Stopped,
}

const NAME_PREFIX: &str = "Name";
const ICY_PREFIX: &str = "ICY Info:";
const STREAM_TITLE_KEY: &str = "StreamTitle=";
const BITRATE_PREFIX: &str = "Bitrate";
const VOLUME_MARKER: &str = "Volume:";
const MUTE_MARKER: &str = "Mute:";

/// Value after the first colon, trimmed. `None` when there is no colon.
fn field_value(line: &str) -> Option<&str> {
    line.split_once(':').map(|(_, v)| v.trim())
}

fn parse_stream_title(icy: &str) -> Option<String> {
    icy.split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix(STREAM_TITLE_KEY))
        .map(|v| {
            let v = v.strip_prefix('\'').unwrap_or(v);
            let v = v.strip_suffix('\'').unwrap_or(v);
            v.to_string()
        })
}

/// Decode a single line of player output.
pub fn parse_status_line(line: &str) -> Option<StatusEvent> {
    let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');

    if line.starts_with(NAME_PREFIX) {
        return field_value(line).map(|v| StatusEvent::StationName(v.to_string()));
    }
    if let Some(icy) = line.strip_prefix(ICY_PREFIX) {
        return parse_stream_title(icy).map(StatusEvent::Title);
    }
    if line.starts_with(BITRATE_PREFIX) {
        return field_value(line).map(|v| StatusEvent::Bitrate(v.to_string()));
    }
    if let Some(idx) = line.find(VOLUME_MARKER) {
        let rest = line[idx + VOLUME_MARKER.len()..].trim();
        let level = rest.split(' ').next().unwrap_or_default();
        if level.is_empty() {
            return None;
        }
        return Some(StatusEvent::Volume(level.to_string()));
    }
    if let Some(idx) = line.find(MUTE_MARKER) {
        let rest = &line[idx + MUTE_MARKER.len()..];
        return Some(StatusEvent::Mute(rest.contains("enabled")));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_bytes() {
        assert_eq!(Transport::VolumeUp.byte(), b'*');
        assert_eq!(Transport::VolumeDown.byte(), b'/');
        assert_eq!(Transport::ToggleMute.byte(), b'm');
        assert_eq!(Transport::Quit.byte(), b'q');
    }

    #[test]
    fn test_parse_name_keeps_colons_in_value() {
        assert_eq!(
            parse_status_line("Name   : Radio: Hamburg\n"),
            Some(StatusEvent::StationName("Radio: Hamburg".into()))
        );
    }

    #[test]
    fn test_parse_icy_title() {
        let line = "ICY Info: StreamTitle='Daft Punk - Around The World';StreamUrl='';\n";
        assert_eq!(
            parse_status_line(line),
            Some(StatusEvent::Title("Daft Punk - Around The World".into()))
        );
    }

    #[test]
    fn test_parse_icy_without_title() {
        assert_eq!(parse_status_line("ICY Info: StreamUrl='x';"), None);
    }

    #[test]
    fn test_parse_bitrate_volume_mute() {
        assert_eq!(
            parse_status_line("Bitrate: 128kbit/s"),
            Some(StatusEvent::Bitrate("128kbit/s".into()))
        );
        assert_eq!(
            parse_status_line("Volume: 42 %"),
            Some(StatusEvent::Volume("42".into()))
        );
        assert_eq!(
            parse_status_line("Mute: enabled"),
            Some(StatusEvent::Mute(true))
        );
        assert_eq!(
            parse_status_line("Mute: disabled"),
            Some(StatusEvent::Mute(false))
        );
    }

    #[test]
    fn test_unknown_lines_are_ignored() {
        assert_eq!(parse_status_line("Cache fill: 12.00% (123 bytes)"), None);
        assert_eq!(parse_status_line(""), None);
        assert_eq!(parse_status_line("Starting playback..."), None);
    }
}
