use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log every line of player output at debug level.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub backlight: BacklightConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub bluetooth: BluetoothConfig,
    #[serde(default)]
    pub persist: PersistConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    Lcd,
    Oled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_kind")]
    pub kind: DisplayKind,
    #[serde(default)]
    pub scroll_station: bool,
    #[serde(default = "default_scroll_interval_ms")]
    pub scroll_interval_ms: u64,
    #[serde(default = "default_init_delay_secs")]
    pub init_delay_secs: u64,
    /// Panels narrower than this get the compact volume label.
    #[serde(default = "default_volume_format_threshold")]
    pub volume_format_threshold: usize,
    #[serde(default)]
    pub camel_case: bool,
    #[serde(default)]
    pub remove_noise: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacklightConfig {
    #[serde(default)]
    pub auto_off: bool,
    #[serde(default = "default_backlight_off_secs")]
    pub off_after_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,
    #[serde(default)]
    pub pins: PinConfig,
}

/// BCM numbers of the five buttons. All inputs are active-low.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinConfig {
    #[serde(default = "default_pin_next")]
    pub next: u32,
    #[serde(default = "default_pin_prev")]
    pub prev: u32,
    #[serde(default = "default_pin_volume_up")]
    pub volume_up: u32,
    #[serde(default = "default_pin_volume_down")]
    pub volume_down: u32,
    #[serde(default = "default_pin_mute")]
    pub mute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_binary")]
    pub binary: String,
    #[serde(default = "default_player_args")]
    pub args: Vec<String>,
    #[serde(default = "default_quit_timeout_secs")]
    pub quit_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BluetoothConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Input device node that exists while a wireless sink is linked.
    #[serde(default = "default_link_device")]
    pub link_device: PathBuf,
    #[serde(default = "default_bt_poll_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    #[serde(default = "default_save_debounce_secs")]
    pub save_debounce_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_retry_ms")]
    pub retry_ms: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "platform::default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "platform::default_stations_file")]
    pub stations_file: PathBuf,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            kind: default_display_kind(),
            scroll_station: false,
            scroll_interval_ms: default_scroll_interval_ms(),
            init_delay_secs: default_init_delay_secs(),
            volume_format_threshold: default_volume_format_threshold(),
            camel_case: false,
            remove_noise: false,
        }
    }
}

impl Default for BacklightConfig {
    fn default() -> Self {
        Self {
            auto_off: false,
            off_after_secs: default_backlight_off_secs(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
            gpio_root: default_gpio_root(),
            pins: PinConfig::default(),
        }
    }
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            next: default_pin_next(),
            prev: default_pin_prev(),
            volume_up: default_pin_volume_up(),
            volume_down: default_pin_volume_down(),
            mute: default_pin_mute(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: default_player_binary(),
            args: default_player_args(),
            quit_timeout_secs: default_quit_timeout_secs(),
        }
    }
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            link_device: default_link_device(),
            poll_interval_secs: default_bt_poll_secs(),
        }
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            save_debounce_secs: default_save_debounce_secs(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            retry_ms: default_probe_retry_ms(),
            timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_file: platform::default_state_file(),
            stations_file: platform::default_stations_file(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_display_kind() -> DisplayKind {
    DisplayKind::Lcd
}

fn default_scroll_interval_ms() -> u64 {
    500
}

fn default_init_delay_secs() -> u64 {
    3
}

fn default_volume_format_threshold() -> usize {
    20
}

fn default_backlight_off_secs() -> u64 {
    15
}

fn default_poll_interval_ms() -> u64 {
    70
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_gpio_root() -> PathBuf {
    PathBuf::from("/sys/class/gpio")
}

fn default_pin_next() -> u32 {
    5
}

fn default_pin_prev() -> u32 {
    6
}

fn default_pin_volume_up() -> u32 {
    19
}

fn default_pin_volume_down() -> u32 {
    26
}

fn default_pin_mute() -> u32 {
    16
}

fn default_player_binary() -> String {
    "mplayer".to_string()
}

fn default_player_args() -> Vec<String> {
    vec!["-quiet".to_string()]
}

fn default_quit_timeout_secs() -> u64 {
    5
}

fn default_link_device() -> PathBuf {
    PathBuf::from("/dev/input/event0")
}

fn default_bt_poll_secs() -> u64 {
    3
}

fn default_save_debounce_secs() -> u64 {
    15
}

fn default_probe_retry_ms() -> u64 {
    300
}

fn default_probe_timeout_secs() -> u64 {
    5
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&platform::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing {}", config_path.display()))?;
        Ok(config.normalized())
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)
            .with_context(|| format!("writing {}", config_path.display()))?;
        Ok(())
    }

    /// Clamp user-supplied values into the ranges the hardware tolerates.
    pub fn normalized(mut self) -> Self {
        self.display.scroll_interval_ms = self.display.scroll_interval_ms.clamp(100, 10_000);
        self.display.init_delay_secs = self.display.init_delay_secs.clamp(1, 10);
        self.backlight.off_after_secs = self.backlight.off_after_secs.clamp(3, 3600);
        self.input.poll_interval_ms = self.input.poll_interval_ms.max(10);
        self.bluetooth.poll_interval_secs = self.bluetooth.poll_interval_secs.max(1);
        self.probe.retry_ms = self.probe.retry_ms.max(50);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            display: DisplayConfig::default(),
            backlight: BacklightConfig::default(),
            input: InputConfig::default(),
            player: PlayerConfig::default(),
            bluetooth: BluetoothConfig::default(),
            persist: PersistConfig::default(),
            probe: ProbeConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.display.kind, DisplayKind::Lcd);
        assert_eq!(config.display.scroll_interval_ms, 500);
        assert_eq!(config.input.debounce_ms, 100);
        assert_eq!(config.input.pins.next, 5);
        assert_eq!(config.player.binary, "mplayer");
        assert_eq!(config.player.args, vec!["-quiet".to_string()]);
        assert!(config.bluetooth.enabled);
        assert!(config.paths.state_file.ends_with(".piradio/last_values"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            debug = true
            [display]
            kind = "oled"
            remove_noise = true
            "#,
        )
        .unwrap();
        assert!(config.debug);
        assert_eq!(config.display.kind, DisplayKind::Oled);
        assert!(config.display.remove_noise);
        assert_eq!(config.display.volume_format_threshold, 20);
        assert_eq!(config.backlight.off_after_secs, 15);
    }

    #[test]
    fn test_normalized_clamps_ranges() {
        let mut config = Config::default();
        config.display.scroll_interval_ms = 5;
        config.display.init_delay_secs = 60;
        config.backlight.off_after_secs = 1;
        let config = config.normalized();
        assert_eq!(config.display.scroll_interval_ms, 100);
        assert_eq!(config.display.init_delay_secs, 10);
        assert_eq!(config.backlight.off_after_secs, 3);

        let mut config = Config::default();
        config.display.scroll_interval_ms = 60_000;
        config.backlight.off_after_secs = 10_000;
        let config = config.normalized();
        assert_eq!(config.display.scroll_interval_ms, 10_000);
        assert_eq!(config.backlight.off_after_secs, 3600);
    }

    #[test]
    fn test_load_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.input.poll_interval_ms, 70);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.player.quit_timeout_secs, 5);
    }
}
