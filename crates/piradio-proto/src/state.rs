use anyhow::Context;
use std::path::Path;
use tracing::{debug, warn};

pub const DEFAULT_VOLUME_ANALOG: u8 = 55;
pub const DEFAULT_VOLUME_WIRELESS: u8 = 35;

/// A radio station as listed on the display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    /// 1-based position in the station file.
    pub ordinal: usize,
    pub name: String,
    pub url: String,
}

impl Station {
    pub fn new(ordinal: usize, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            ordinal,
            name: name.into(),
            url: url.into(),
        }
    }

    /// Label shown on the tuning screen, e.g. `"3 Jazz Radio"`.
    pub fn label(&self) -> String {
        format!("{} {}", self.ordinal, self.name)
    }
}

pub fn default_stations() -> Vec<Station> {
    vec![
        Station::new(
            1,
            "RadioHH",
            "http://stream.radiohamburg.de/rhh-live/mp3-192/linkradiohamburgde",
        ),
        Station::new(2, "Jazz Radio", "http://jazzradio.ice.infomaniak.ch/jazzradio-high.mp3"),
        Station::new(3, "M1.FM Chillout", "http://tuner.m1.fm/chillout.mp3"),
    ]
}

/// Parse `name, url` lines. Lines without exactly two fields are skipped.
pub fn parse_stations(content: &str) -> Vec<Station> {
    let mut stations = Vec::new();
    for line in content.lines() {
        let line = line.trim_matches(|c: char| c == '\n' || c == '\r');
        let items: Vec<&str> = line.split(',').collect();
        if items.len() != 2 {
            continue;
        }
        let ordinal = stations.len() + 1;
        stations.push(Station::new(ordinal, items[0].trim(), items[1].trim()));
    }
    stations
}

/// Load the station list, falling back to the built-in list when the file is
/// missing, unreadable or yields no stations.
pub fn load_stations(path: &Path) -> Vec<Station> {
    let stations = match std::fs::read_to_string(path) {
        Ok(content) => parse_stations(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            warn!("Cannot read station list {}: {}", path.display(), e);
            Vec::new()
        }
    };
    if stations.is_empty() {
        debug!("Using built-in station list");
        return default_stations();
    }
    stations
}

/// State that survives a restart: last station and both volume levels.
///
/// On disk this is two or three newline-separated fields; the station index
/// is stored 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedState {
    pub station_idx: usize,
    pub volume_analog: u8,
    pub volume_wireless: u8,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            station_idx: 0,
            volume_analog: DEFAULT_VOLUME_ANALOG,
            volume_wireless: DEFAULT_VOLUME_WIRELESS,
        }
    }
}

fn parse_volume(field: Option<&str>, default: u8) -> u8 {
    field
        .map(str::trim)
        .and_then(|s| s.parse::<u8>().ok())
        .filter(|v| *v <= 100)
        .unwrap_or(default)
}

impl PersistedState {
    /// Parse file content; missing or malformed fields take their defaults.
    pub fn parse(content: &str) -> Self {
        let mut fields = content.trim_matches(' ').split('\n');
        let station_idx = fields
            .next()
            .map(str::trim)
            .and_then(|s| s.parse::<usize>().ok())
            .and_then(|n| n.checked_sub(1))
            .unwrap_or(0);
        let volume_analog = parse_volume(fields.next(), DEFAULT_VOLUME_ANALOG);
        let volume_wireless = parse_volume(fields.next(), DEFAULT_VOLUME_WIRELESS);
        Self {
            station_idx,
            volume_analog,
            volume_wireless,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.station_idx + 1,
            self.volume_analog,
            self.volume_wireless
        )
    }

    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let state = Self::parse(&content);
                debug!("Loaded persisted state {:?}", state);
                state
            }
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(path, self.render())
            .with_context(|| format!("writing {}", path.display()))?;
        debug!("Saved persisted state {:?}", self);
        Ok(())
    }
}
