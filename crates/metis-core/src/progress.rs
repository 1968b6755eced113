//! Completion math for a single task and the encodings derived from it.

use crate::General;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub percent: f64,
    pub done: i64,
    pub total: i64,
}

impl Progress {
    /// Values above 100 are kept so inconsistent producer counts stay visible.
    pub fn new(done: i64, total: i64) -> Self {
        let percent = if total > 0 {
            (100.0 * done as f64 / total as f64).max(0.0)
        } else {
            0.0
        };
        Self {
            percent,
            done,
            total,
        }
    }

    pub fn compute(general: &General) -> Self {
        Self::new(general.njobs_done, general.njobs_total)
    }

    /// The integral percentage used for bar width, label and color.
    pub fn whole_percent(&self) -> i64 {
        self.percent.floor() as i64
    }

    pub fn label(&self) -> String {
        format!("{}%", self.whole_percent())
    }

    pub fn hover_title(&self) -> String {
        format!("{}/{}", self.done, self.total)
    }
}

/// Cylindrical (HSL) color for a progress bar. Saturation and lightness are
/// percentages, hue is in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarColor {
    pub hue: i64,
    pub saturation: i64,
    pub lightness: i64,
}

impl BarColor {
    pub fn for_percent(percent: f64) -> Self {
        let bump = (1.0 - (percent - 33.0).powi(2) / 4500.0).max(0.0);
        Self {
            hue: (percent * 1.35).round() as i64,
            saturation: (75.0 - 0.1 * percent + 15.0 * bump).round() as i64,
            lightness: (58.0 - 0.14 * percent).round() as i64,
        }
    }

    pub fn to_rgb(&self) -> (u8, u8, u8) {
        let hue = (self.hue as f64).rem_euclid(360.0) / 60.0;
        let saturation = (self.saturation as f64 / 100.0).clamp(0.0, 1.0);
        let lightness = (self.lightness as f64 / 100.0).clamp(0.0, 1.0);

        let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
        let x = chroma * (1.0 - (hue % 2.0 - 1.0).abs());
        let (r, g, b) = match hue as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = lightness - chroma / 2.0;
        let channel = |value: f64| ((value + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        (channel(r), channel(g), channel(b))
    }
}

/// Human label for an event rate: kHz with three significant digits above
/// 200 Hz, the raw value below. Absent or non-positive rates get no label.
pub fn rate_label(event_rate: Option<f64>) -> Option<String> {
    let rate = event_rate.filter(|rate| rate.is_finite() && *rate > 0.0)?;
    if rate > 200.0 {
        Some(format!("{} kHz", round_significant(rate / 1000.0, 3)))
    } else {
        Some(format!("{rate} Hz"))
    }
}

fn round_significant(value: f64, digits: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let shift = digits - 1 - value.abs().log10().floor() as i32;
    if shift >= 0 {
        let factor = 10f64.powi(shift);
        (value * factor).round() / factor
    } else {
        let factor = 10f64.powi(-shift);
        (value / factor).round() * factor
    }
}
