//! Glyph widths of the standard 14 fonts, used when a simple font omits
//! `/Widths`. Widths are in 1/1000 of text space; tables cover ASCII 32..=126.

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[rustfmt::skip]
const TIMES_ROMAN: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

/// Width table chosen from a `/BaseFont` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardMetrics {
    Helvetica,
    HelveticaBold,
    TimesRoman,
    Courier,
}

impl StandardMetrics {
    /// Picks a table for a base font name, subset prefix (`ABCDEF+`) ignored.
    pub fn for_base_font(name: &str) -> Option<Self> {
        let name = name.split_once('+').map(|(_, rest)| rest).unwrap_or(name);
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("courier") {
            Some(StandardMetrics::Courier)
        } else if lower.starts_with("times") {
            Some(StandardMetrics::TimesRoman)
        } else if lower.starts_with("helvetica") || lower.starts_with("arial") {
            if lower.contains("bold") {
                Some(StandardMetrics::HelveticaBold)
            } else {
                Some(StandardMetrics::Helvetica)
            }
        } else {
            None
        }
    }

    /// Width of the glyph for `ch`, falling back to the table's typical width.
    pub fn width(&self, ch: char) -> f64 {
        let table = match self {
            StandardMetrics::Courier => return 600.0,
            StandardMetrics::Helvetica => &HELVETICA,
            StandardMetrics::HelveticaBold => &HELVETICA_BOLD,
            StandardMetrics::TimesRoman => &TIMES_ROMAN,
        };
        let code = ch as u32;
        if (32..=126).contains(&code) {
            table[(code - 32) as usize] as f64
        } else {
            // Lowercase 'n' is a reasonable average for accented letters.
            table[(b'n' - 32) as usize] as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_font_selection() {
        assert_eq!(
            StandardMetrics::for_base_font("Helvetica-Bold"),
            Some(StandardMetrics::HelveticaBold)
        );
        assert_eq!(
            StandardMetrics::for_base_font("ABCDEF+Times-Italic"),
            Some(StandardMetrics::TimesRoman)
        );
        assert_eq!(StandardMetrics::for_base_font("Symbol"), None);
    }

    #[test]
    fn test_widths() {
        let helvetica = StandardMetrics::Helvetica;
        assert_eq!(helvetica.width(' '), 278.0);
        assert_eq!(helvetica.width('W'), 944.0);
        assert_eq!(helvetica.width('~'), 584.0);
        assert_eq!(StandardMetrics::TimesRoman.width('a'), 444.0);
        assert_eq!(StandardMetrics::Courier.width('é'), 600.0);
    }
}
