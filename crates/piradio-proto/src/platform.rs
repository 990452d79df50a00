use std::path::{Path, PathBuf};

/// Name of the per-user directory holding config, state, stations and log.
const DATA_DIR_NAME: &str = ".piradio";

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

pub fn log_path() -> PathBuf {
    data_dir().join("piradio.log")
}

pub fn default_state_file() -> PathBuf {
    data_dir().join("last_values")
}

pub fn default_stations_file() -> PathBuf {
    data_dir().join("stations")
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var("PATH").ok()?;
    for dir in path.split(':') {
        let p = PathBuf::from(dir).join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

/// Resolve the player binary.
/// Absolute or relative paths with a separator are used as given when they
/// exist; bare names are looked up on `PATH`.
pub fn find_player_binary(name: &str) -> Option<PathBuf> {
    let as_path = Path::new(name);
    if as_path.components().count() > 1 {
        return as_path.exists().then(|| as_path.to_path_buf());
    }
    find_on_path(name)
}
