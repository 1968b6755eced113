use metis_core::highlight::TokenKind;
use metis_core::progress::BarColor;
use ratatui::style::{Color, Modifier, Style};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(60, 56, 54))
    .add_modifier(Modifier::BOLD);
pub const MUTED_STYLE: Style = Style::new().fg(Color::Rgb(146, 131, 116));
pub const STALE_STYLE: Style = Style::new()
    .fg(Color::Rgb(254, 128, 25))
    .add_modifier(Modifier::BOLD);
pub const LINK_STYLE: Style = Style::new()
    .fg(Color::Rgb(131, 165, 152))
    .add_modifier(Modifier::UNDERLINED);
pub const TYPE_BADGE_STYLE: Style = Style::new()
    .fg(Color::Black)
    .bg(Color::Rgb(189, 174, 147));
pub const WARN_STYLE: Style = Style::new().fg(Color::Rgb(250, 189, 47));

pub fn zebra_row_style(index: usize) -> Style {
    let bg = if index % 2 == 0 {
        Color::Rgb(18, 20, 26)
    } else {
        Color::Rgb(24, 27, 34)
    };
    Style::new().bg(bg)
}

/// Stable color per tag so the same campaign tag reads the same everywhere.
pub fn tag_badge_style(tag: &str) -> Style {
    let palette = [
        Color::Rgb(131, 165, 152),
        Color::Rgb(69, 133, 136),
        Color::Rgb(142, 192, 124),
        Color::Rgb(104, 157, 106),
        Color::Rgb(184, 187, 38),
        Color::Rgb(250, 189, 47),
        Color::Rgb(254, 128, 25),
        Color::Rgb(211, 134, 155),
        Color::Rgb(177, 98, 134),
        Color::Rgb(168, 153, 132),
    ];
    let mut hash: u64 = 1469598103934665603;
    for b in tag.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    let color = palette[(hash as usize) % palette.len()];
    Style::new().fg(color).add_modifier(Modifier::BOLD)
}

pub fn bar_color(color: Option<BarColor>) -> Color {
    match color {
        Some(color) => {
            let (r, g, b) = color.to_rgb();
            Color::Rgb(r, g, b)
        }
        None => Color::Rgb(80, 73, 69),
    }
}

pub fn token_style(kind: TokenKind) -> Style {
    match kind {
        TokenKind::Key => Style::new().fg(Color::Rgb(211, 134, 155)),
        TokenKind::String => Style::new().fg(Color::Rgb(184, 187, 38)),
        TokenKind::Number => Style::new().fg(Color::Rgb(254, 128, 25)),
        TokenKind::Boolean => Style::new().fg(Color::Rgb(131, 165, 152)),
        TokenKind::Null => Style::new().fg(Color::Rgb(146, 131, 116)),
        TokenKind::Punct => Style::new().fg(Color::Rgb(189, 174, 147)),
    }
}

pub fn status_color(status: &str) -> Color {
    match status.to_lowercase().as_str() {
        "done" => Color::Rgb(184, 187, 38),
        "running" => Color::Rgb(131, 165, 152),
        "failed" => Color::Rgb(214, 93, 14),
        _ => Color::Rgb(146, 131, 116),
    }
}

pub mod icons {
    pub const EXPANDED: &str = "v";
    pub const COLLAPSED: &str = ">";
    pub const RETRY: &str = "!";
}
