//! Screen layout on top of the command queue.
//!
//! Four rows: station (0), artist (1), track (2) and the bitrate/volume
//! footer (3). Everything printed here is trimmed and shaped for the panel
//! before it is queued.

use piradio_proto::config::DisplayConfig;
use piradio_proto::text::{beautify, remove_noise, split_title};

use super::DisplayQueue;

pub const STATION_LINE: usize = 0;
pub const ARTIST_LINE: usize = 1;
pub const TRACK_LINE: usize = 2;
pub const FOOTER_LINE: usize = 3;

const STOPPED_TEXT: &str = "Playing stopped";
const MUTED_LABEL: &str = "-mute-";

#[derive(Debug, Clone)]
struct Shaping {
    camel_case: bool,
    remove_noise: bool,
    scroll_station: bool,
    volume_format_threshold: usize,
}

#[derive(Clone)]
pub struct Screen {
    queue: DisplayQueue,
    shaping: Shaping,
}

impl Screen {
    pub fn new(queue: DisplayQueue, config: &DisplayConfig) -> Self {
        Self {
            queue,
            shaping: Shaping {
                camel_case: config.camel_case,
                remove_noise: config.remove_noise,
                scroll_station: config.scroll_station,
                volume_format_threshold: config.volume_format_threshold,
            },
        }
    }

    pub fn queue(&self) -> &DisplayQueue {
        &self.queue
    }

    fn narrow(&self) -> bool {
        self.queue.chars_per_line() < self.shaping.volume_format_threshold
    }

    /// Trim and beautify `text`, then queue it. The track line is also
    /// stripped of noise when enabled.
    pub fn print(&self, line: usize, text: &str, scroll: bool) {
        let mut shaped = beautify(text.trim(), self.shaping.camel_case);
        if line == TRACK_LINE && self.shaping.remove_noise {
            shaped = remove_noise(&shaped);
        }
        self.queue.print_line(line, &shaped, scroll);
    }

    /// Screen shown while a new session starts.
    pub fn tuning(&self, label: &str, footer: &str) {
        self.queue.clear();
        self.print(STATION_LINE, &format!("-> {}", label), false);
        self.print(ARTIST_LINE, "", false);
        self.print(TRACK_LINE, "", false);
        self.print(FOOTER_LINE, footer, false);
    }

    pub fn station_name(&self, name: &str) {
        self.print(STATION_LINE, name, self.shaping.scroll_station);
    }

    /// `"Artist - Track"` goes to two lines; anything else fills the artist
    /// line and blanks the track line.
    pub fn title(&self, title: &str) {
        match split_title(title) {
            (artist, Some(track)) => {
                self.print(ARTIST_LINE, artist, true);
                self.print(TRACK_LINE, track, true);
            }
            (whole, None) => {
                self.print(ARTIST_LINE, whole, true);
                self.print(TRACK_LINE, "", false);
            }
        }
    }

    pub fn stopped(&self) {
        self.print(ARTIST_LINE, STOPPED_TEXT, false);
        self.print(TRACK_LINE, "", false);
    }

    /// Label for a volume level as the player prints it, e.g. `"Vol 55%"`.
    pub fn volume_label(&self, level: &str) -> String {
        if self.narrow() {
            format!("V {}%", level)
        } else {
            format!("Vol {}%", level)
        }
    }

    /// Bitrate left, volume right. Printed verbatim.
    pub fn footer(&self, bitrate: &str, volume_label: &str, muted: bool) {
        let volume = if muted { MUTED_LABEL } else { volume_label };
        let text = if self.narrow() {
            format!("{:<10}{:>8}", bitrate, volume)
        } else {
            format!("{:<10}{:>10}", bitrate, volume)
        };
        self.queue.print_line(FOOTER_LINE, &text, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::tests::RecordingDevice;
    use std::time::Duration;

    fn screen(columns: usize, config: DisplayConfig) -> (Screen, RecordingDevice) {
        let device = RecordingDevice::new(columns);
        let queue = DisplayQueue::start(Box::new(device.clone()), Duration::from_secs(5)).unwrap();
        (Screen::new(queue, &config), device)
    }

    #[tokio::test]
    async fn test_title_split_across_two_lines() {
        let (screen, device) = screen(40, DisplayConfig::default());
        screen.title("Artist - Track");
        screen.title("Just a show");
        screen.queue().close().await;

        assert_eq!(device.lines_on(ARTIST_LINE), vec!["Artist", "Just a show"]);
        assert_eq!(device.lines_on(TRACK_LINE), vec!["Track", ""]);
    }

    #[tokio::test]
    async fn test_noise_removed_from_track_line_only() {
        let config = DisplayConfig {
            remove_noise: true,
            ..DisplayConfig::default()
        };
        let (screen, device) = screen(60, config);
        screen.title("Tide (Electro RMX) - Memory Pages (CDM Radio Edit)");
        screen.queue().close().await;

        assert_eq!(device.lines_on(ARTIST_LINE), vec!["Tide (Electro RMX)"]);
        assert_eq!(device.lines_on(TRACK_LINE), vec!["Memory Pages"]);
    }

    #[tokio::test]
    async fn test_footer_formats_by_width() {
        let (wide, wide_dev) = screen(20, DisplayConfig::default());
        let label = wide.volume_label("55");
        wide.footer("128 kbit/s", &label, false);
        wide.footer("128 kbit/s", &label, true);
        wide.queue().close().await;
        assert_eq!(
            wide_dev.lines_on(FOOTER_LINE),
            vec!["128 kbit/s   Vol 55%", "128 kbit/s    -mute-"]
        );

        let (narrow, narrow_dev) = screen(18, DisplayConfig::default());
        let label = narrow.volume_label("7");
        narrow.footer("64 kbit/s", &label, false);
        narrow.queue().close().await;
        assert_eq!(narrow_dev.lines_on(FOOTER_LINE), vec!["64 kbit/s     V 7%"]);
    }

    #[tokio::test]
    async fn test_tuning_screen() {
        let (screen, device) = screen(20, DisplayConfig::default());
        screen.tuning("2 Jazz Radio", "12:00:00  01.01.26");
        screen.queue().close().await;

        let commands = device.commands();
        assert_eq!(commands[0], crate::display::DisplayCommand::Clear);
        assert_eq!(device.lines_on(STATION_LINE), vec!["-> 2 Jazz Radio"]);
        assert_eq!(device.lines_on(ARTIST_LINE), vec![""]);
        assert_eq!(device.lines_on(FOOTER_LINE), vec!["12:00:00  01.01.26"]);
    }
}
