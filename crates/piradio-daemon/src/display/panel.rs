//! Physical panels.
//!
//! A `Device` is the slow, stateful thing at the end of the command queue.
//! Only the queue's consumer thread ever calls into it. Both panels keep a
//! shadow frame of what is on the glass and push that frame to their output
//! after every mutation.

use std::io::Write;

use thiserror::Error;

pub const LCD_COLUMNS: usize = 20;
pub const OLED_COLUMNS: usize = 18;
pub const PANEL_ROWS: usize = 4;

const ELLIPSIS: &str = "...";

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("line {0} is outside the panel")]
    LineOutOfRange(usize),
    #[error("panel write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub columns: usize,
    pub rows: usize,
    pub backlight: bool,
}

pub trait Device: Send {
    fn geometry(&self) -> Geometry;
    fn clear(&mut self) -> Result<(), DeviceError>;
    fn set_backlight(&mut self, on: bool) -> Result<(), DeviceError>;
    fn clear_line(&mut self, line: usize) -> Result<(), DeviceError>;
    fn write_line(&mut self, line: usize, text: &str) -> Result<(), DeviceError>;
    fn close(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

/// Shadow of the visible rows plus the writer the frame is pushed to.
struct Frame<W> {
    rows: Vec<String>,
    lit: bool,
    out: W,
}

impl<W: Write> Frame<W> {
    fn new(out: W) -> Self {
        Self {
            rows: vec![String::new(); PANEL_ROWS],
            lit: true,
            out,
        }
    }

    fn row_mut(&mut self, line: usize) -> Result<&mut String, DeviceError> {
        self.rows.get_mut(line).ok_or(DeviceError::LineOutOfRange(line))
    }

    fn push(&mut self, columns: usize) -> Result<(), DeviceError> {
        let edge = if self.lit { '=' } else { '-' };
        let border: String = std::iter::once('+')
            .chain(std::iter::repeat(edge).take(columns))
            .chain(std::iter::once('+'))
            .collect();
        writeln!(self.out, "{}", border)?;
        for row in &self.rows {
            writeln!(self.out, "|{:<width$}|", row, width = columns)?;
        }
        writeln!(self.out, "{}", border)?;
        self.out.flush()?;
        Ok(())
    }
}

/// 20x4 character LCD with a switchable backlight.
///
/// Rows are always written blank-padded to the full width, so clearing a
/// single row is never needed.
pub struct CharLcd<W> {
    frame: Frame<W>,
    ellipsize_header: bool,
}

impl<W: Write + Send> CharLcd<W> {
    pub fn new(out: W, ellipsize_header: bool) -> Self {
        Self {
            frame: Frame::new(out),
            ellipsize_header,
        }
    }

    fn fit(&self, line: usize, text: &str) -> String {
        let len = text.chars().count();
        let fitted = if len > LCD_COLUMNS && line == 0 && self.ellipsize_header {
            let mut s = truncate(text, LCD_COLUMNS - ELLIPSIS.len());
            s.push_str(ELLIPSIS);
            s
        } else {
            truncate(text, LCD_COLUMNS)
        };
        format!("{:<width$}", fitted, width = LCD_COLUMNS)
    }
}

impl<W: Write + Send> Device for CharLcd<W> {
    fn geometry(&self) -> Geometry {
        Geometry {
            columns: LCD_COLUMNS,
            rows: PANEL_ROWS,
            backlight: true,
        }
    }

    fn clear(&mut self) -> Result<(), DeviceError> {
        for row in &mut self.frame.rows {
            row.clear();
        }
        self.frame.push(LCD_COLUMNS)
    }

    fn set_backlight(&mut self, on: bool) -> Result<(), DeviceError> {
        self.frame.lit = on;
        self.frame.push(LCD_COLUMNS)
    }

    fn clear_line(&mut self, _line: usize) -> Result<(), DeviceError> {
        Ok(())
    }

    fn write_line(&mut self, line: usize, text: &str) -> Result<(), DeviceError> {
        let fitted = self.fit(line, text);
        *self.frame.row_mut(line)? = fitted;
        self.frame.push(LCD_COLUMNS)
    }
}

/// 18x4 OLED. Has no backlight; rows must be blanked before redrawing since
/// glyphs are drawn over whatever pixels are lit.
pub struct Oled<W> {
    frame: Frame<W>,
}

impl<W: Write + Send> Oled<W> {
    pub fn new(out: W) -> Self {
        Self {
            frame: Frame::new(out),
        }
    }
}

impl<W: Write + Send> Device for Oled<W> {
    fn geometry(&self) -> Geometry {
        Geometry {
            columns: OLED_COLUMNS,
            rows: PANEL_ROWS,
            backlight: false,
        }
    }

    fn clear(&mut self) -> Result<(), DeviceError> {
        for row in &mut self.frame.rows {
            row.clear();
        }
        self.frame.push(OLED_COLUMNS)
    }

    fn set_backlight(&mut self, _on: bool) -> Result<(), DeviceError> {
        Ok(())
    }

    fn clear_line(&mut self, line: usize) -> Result<(), DeviceError> {
        self.frame.row_mut(line)?.clear();
        self.frame.push(OLED_COLUMNS)
    }

    fn write_line(&mut self, line: usize, text: &str) -> Result<(), DeviceError> {
        let row = self.frame.row_mut(line)?;
        row.clear();
        row.push_str(&truncate(text, OLED_COLUMNS));
        self.frame.push(OLED_COLUMNS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows_of(output: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(output);
        let frame: Vec<&str> = text.lines().collect();
        // last pushed frame: border, 4 rows, border
        frame[frame.len() - 5..frame.len() - 1]
            .iter()
            .map(|l| l.trim_start_matches('|').trim_end_matches('|').to_string())
            .collect()
    }

    #[test]
    fn test_lcd_pads_and_ellipsizes_header() {
        let mut out = Vec::new();
        {
            let mut lcd = CharLcd::new(&mut out, true);
            lcd.write_line(0, "-> 1 A very long station name").unwrap();
            lcd.write_line(1, "short").unwrap();
        }
        let rows = rows_of(&out);
        assert_eq!(rows[0], "-> 1 A very long ...");
        assert_eq!(rows[0].len(), LCD_COLUMNS);
        assert_eq!(rows[1], format!("{:<20}", "short"));
    }

    #[test]
    fn test_lcd_truncates_without_ellipsis() {
        let mut out = Vec::new();
        {
            let mut lcd = CharLcd::new(&mut out, false);
            lcd.write_line(0, "abcdefghijklmnopqrstuvwxyz").unwrap();
        }
        assert_eq!(rows_of(&out)[0], "abcdefghijklmnopqrst");
    }

    #[test]
    fn test_oled_clear_line_and_geometry() {
        let mut out = Vec::new();
        {
            let mut oled = Oled::new(&mut out);
            assert_eq!(oled.geometry().columns, OLED_COLUMNS);
            assert!(!oled.geometry().backlight);
            oled.write_line(2, "abcdefghijklmnopqrstuvwxyz").unwrap();
            oled.write_line(3, "keep").unwrap();
            oled.clear_line(3).unwrap();
        }
        let rows = rows_of(&out);
        assert_eq!(rows[2], "abcdefghijklmnopqr");
        assert_eq!(rows[3].trim(), "");
    }

    #[test]
    fn test_line_out_of_range() {
        let mut oled = Oled::new(Vec::new());
        assert!(matches!(
            oled.write_line(7, "x"),
            Err(DeviceError::LineOutOfRange(7))
        ));
    }
}
