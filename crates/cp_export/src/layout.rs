//! Page layout for article reports, in PDF points.

use cp_core::Article;

pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;
pub const MARGIN: f32 = 72.0;
pub const TEXT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

const TITLE_SPACE_AFTER: f32 = 24.0;
const SPACER: f32 = 24.0;
const SOURCE_SPACE_BEFORE: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
    Oblique,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub face: Face,
    pub size: f32,
    pub leading: f32,
    pub centered: bool,
    pub rgb: (f32, f32, f32),
}

pub const TITLE: Style = Style { face: Face::Bold, size: 24.0, leading: 28.8, centered: true, rgb: (0.0, 0.0, 0.0) };
pub const BODY: Style = Style { face: Face::Regular, size: 12.0, leading: 18.0, centered: false, rgb: (0.0, 0.0, 0.0) };
pub const SOURCE: Style = Style { face: Face::Oblique, size: 10.0, leading: 12.0, centered: false, rgb: (0.0, 0.0, 1.0) };

/// One line of text positioned by its baseline origin.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub style: Style,
}

/// Approximate Helvetica advance width in em units.
fn char_width(c: char) -> f32 {
    match c {
        'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '!' | '|' | ' ' => 0.278,
        'f' | 't' | 'I' | 'r' | '(' | ')' | '[' | ']' | '/' | '-' => 0.333,
        'm' | 'M' | 'W' => 0.833,
        'w' => 0.722,
        '0'..='9' => 0.556,
        'A'..='Z' => 0.667,
        _ => 0.556,
    }
}

pub fn text_width(text: &str, style: &Style) -> f32 {
    let widen = if style.face == Face::Bold { 1.06 } else { 1.0 };
    text.chars().map(char_width).sum::<f32>() * style.size * widen
}

/// Characters a font can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// The built-in Type1 faces, written with WinAnsiEncoding.
    #[default]
    WinAnsi,
    /// An embedded TrueType font.
    Unicode,
}

/// The CP1252 characters in 0x80..=0x9F that WinAnsiEncoding maps.
const WIN_ANSI_EXTRAS: &[char] = &[
    '\u{20AC}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}', '\u{02C6}',
    '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{017D}', '\u{2018}', '\u{2019}', '\u{201C}',
    '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}', '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}',
    '\u{0153}', '\u{017E}', '\u{0178}',
];

impl Charset {
    pub fn contains(&self, c: char) -> bool {
        match self {
            Charset::Unicode => true,
            Charset::WinAnsi => {
                matches!(c, ' '..='~' | '\u{A1}'..='\u{AC}' | '\u{AE}'..='\u{FF}') || WIN_ANSI_EXTRAS.contains(&c)
            }
        }
    }
}

/// Replace characters `charset` cannot show. Unencodable characters would
/// otherwise be dropped silently by the PDF writer.
pub fn sanitize(text: &str, charset: Charset) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\n' => Some(c),
            '\u{AD}' => None,
            c if c.is_control() => Some(' '),
            c if charset.contains(c) => Some(c),
            '\u{A0}' => Some(' '),
            '\u{2010}'..='\u{2012}' | '\u{2015}' | '\u{2212}' => Some('-'),
            '\u{2032}' => Some('\''),
            '\u{2033}' => Some('"'),
            _ => Some('?'),
        })
        .collect()
}

/// Greedy word wrap to `max_width`. Words wider than a line are split.
pub fn wrap(text: &str, style: &Style, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if text_width(&candidate, style) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if text_width(word, style) <= max_width {
            current = word.to_string();
            continue;
        }
        for c in word.chars() {
            current.push(c);
            if text_width(&current, style) > max_width && current.chars().count() > 1 {
                current.pop();
                lines.push(std::mem::replace(&mut current, c.to_string()));
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

struct Cursor {
    pages: Vec<Vec<PlacedLine>>,
    y: f32,
}

impl Cursor {
    fn new() -> Self {
        Self { pages: vec![Vec::new()], y: PAGE_HEIGHT - MARGIN }
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn skip(&mut self, amount: f32) {
        if self.y - amount < MARGIN {
            self.new_page();
        } else {
            self.y -= amount;
        }
    }

    fn line(&mut self, text: String, style: Style) {
        if self.y - style.leading < MARGIN {
            self.new_page();
        }
        self.y -= style.leading;
        let x = if style.centered {
            MARGIN + ((TEXT_WIDTH - text_width(&text, &style)) / 2.0).max(0.0)
        } else {
            MARGIN
        };
        let baseline = self.y + (style.leading - style.size);
        if let Some(page) = self.pages.last_mut() {
            page.push(PlacedLine { text, x, y: baseline, style });
        }
    }

    fn paragraph(&mut self, text: &str, style: Style) {
        for line in wrap(text, &style, TEXT_WIDTH) {
            self.line(line, style);
        }
    }
}

/// Lay out title, summary and source link into pages of lines.
pub fn layout(article: &Article, charset: Charset) -> Vec<Vec<PlacedLine>> {
    let mut cursor = Cursor::new();

    cursor.paragraph(&sanitize(&article.title, charset), TITLE);
    cursor.skip(TITLE_SPACE_AFTER);

    for line in sanitize(&article.summary, charset).split('\n') {
        if line.trim().is_empty() {
            cursor.skip(BODY.leading);
        } else {
            cursor.paragraph(line, BODY);
        }
    }

    cursor.skip(SPACER + SOURCE_SPACE_BEFORE);
    cursor.paragraph(&format!("Source: {}", sanitize(&article.url, charset)), SOURCE);

    cursor.pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_respects_width() {
        let text = "General relativity is the geometric theory of gravitation published by Albert Einstein in 1915 and is the current description of gravitation in modern physics.";
        let lines = wrap(text, &BODY, TEXT_WIDTH);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width(line, &BODY) <= TEXT_WIDTH, "line too wide: {}", line);
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn test_wrap_splits_overlong_words() {
        let url = format!("https://example.org/{}", "x".repeat(200));
        let lines = wrap(&url, &SOURCE, TEXT_WIDTH);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), url);
    }

    #[test]
    fn test_sanitize_keeps_win_ansi_punctuation() {
        let text = "Albert Einstein (14 March 1879 \u{2013} 18 April 1955) \u{2014} \u{201C}the father of relativity\u{201D}\u{2026} \u{20AC}5 \u{2018}Caf\u{e9}\u{2019}";
        assert_eq!(sanitize(text, Charset::WinAnsi), text);
    }

    #[test]
    fn test_sanitize_replaces_what_the_charset_cannot_show() {
        assert_eq!(sanitize("The number \u{3c0} \u{2212} \u{4e2d}", Charset::WinAnsi), "The number ? - ?");
        assert_eq!(sanitize("The number \u{3c0} \u{4e2d}", Charset::Unicode), "The number \u{3c0} \u{4e2d}");
        assert_eq!(sanitize("a\tb\nc\u{7}", Charset::WinAnsi), "a b\nc ");
        assert_eq!(sanitize("Ein\u{AD}stein\u{A0}1879", Charset::WinAnsi), "Einstein 1879");
    }

    #[test]
    fn test_layout_keeps_line_breaks_and_order() {
        let article = Article::new("Rust", "First paragraph.\n\nSecond paragraph.", "https://example.org/Rust");
        let pages = layout(&article, Charset::WinAnsi);
        assert_eq!(pages.len(), 1);

        let texts: Vec<&str> = pages[0].iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Rust", "First paragraph.", "Second paragraph.", "Source: https://example.org/Rust"]);

        let first = &pages[0][1];
        let second = &pages[0][2];
        assert!(first.y - second.y > BODY.leading, "blank line should add vertical space");
        assert!(pages[0][0].x > MARGIN, "title is centered");
        assert_eq!(pages[0][3].style, SOURCE);
    }

    #[test]
    fn test_long_summary_paginates_within_margins() {
        let summary = (0..120).map(|i| format!("Line number {}.", i)).collect::<Vec<_>>().join("\n");
        let article = Article::new("Long", summary, "https://example.org/Long");
        let pages = layout(&article, Charset::WinAnsi);
        assert!(pages.len() > 1);
        for line in pages.iter().flatten() {
            assert!(line.y >= MARGIN - 0.01 && line.y <= PAGE_HEIGHT - MARGIN, "{:?}", line);
        }
        assert!(pages.last().unwrap().last().unwrap().text.starts_with("Source:"));
    }
}
