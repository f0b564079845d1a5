//! Terminal styling for check reports.
//!
//! Color and Unicode are detected from the environment so piped output and
//! dumb terminals get plain ASCII.

/// ANSI escape codes used by the reports.
pub mod colors {
    /// Reset all styling.
    pub const RESET: &str = "\x1b[0m";
    /// Bright bold white for headings.
    pub const WHITE_BOLD: &str = "\x1b[1;97m";
    /// Gray for secondary detail lines.
    pub const GRAY: &str = "\x1b[90m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RED: &str = "\x1b[31m";
}

/// Resolved color codes, either ANSI sequences or empty strings.
#[derive(Debug, Clone, Copy)]
pub struct ColorPalette {
    pub reset: &'static str,
    pub heading: &'static str,
    pub detail: &'static str,
    pub ok: &'static str,
    pub warn: &'static str,
    pub fail: &'static str,
}

impl ColorPalette {
    #[must_use]
    pub const fn colored() -> Self {
        Self {
            reset: colors::RESET,
            heading: colors::WHITE_BOLD,
            detail: colors::GRAY,
            ok: colors::GREEN,
            warn: colors::YELLOW,
            fail: colors::RED,
        }
    }

    #[must_use]
    pub const fn plain() -> Self {
        Self {
            reset: "",
            heading: "",
            detail: "",
            ok: "",
            warn: "",
            fail: "",
        }
    }

    /// `colored()` when the terminal supports ANSI colors, else `plain()`.
    #[must_use]
    pub fn detect() -> Self {
        if supports_color() {
            Self::colored()
        } else {
            Self::plain()
        }
    }
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::detect()
    }
}

/// Status markers printed in front of each check line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marks {
    pub ok: &'static str,
    pub warn: &'static str,
    pub fail: &'static str,
}

impl Marks {
    pub const UNICODE: Marks = Marks {
        ok: "✓",
        warn: "⚠",
        fail: "✗",
    };

    pub const ASCII: Marks = Marks {
        ok: "[OK]",
        warn: "[WARN]",
        fail: "[FAIL]",
    };

    #[must_use]
    pub fn detect() -> Self {
        if supports_unicode() {
            Self::UNICODE
        } else {
            Self::ASCII
        }
    }
}

/// Palette and markers for one report.
#[derive(Debug, Clone, Copy)]
pub struct Style {
    pub palette: ColorPalette,
    pub marks: Marks,
}

impl Style {
    #[must_use]
    pub fn detect() -> Self {
        Self {
            palette: ColorPalette::detect(),
            marks: Marks::detect(),
        }
    }

    /// No color, ASCII markers.
    #[must_use]
    pub const fn plain() -> Self {
        Self {
            palette: ColorPalette::plain(),
            marks: Marks::ASCII,
        }
    }

    pub fn ok(&self, text: &str) -> String {
        format!("{}{}{} {}", self.palette.ok, self.marks.ok, self.palette.reset, text)
    }

    pub fn warn(&self, text: &str) -> String {
        format!("{}{}{} {}", self.palette.warn, self.marks.warn, self.palette.reset, text)
    }

    pub fn fail(&self, text: &str) -> String {
        format!("{}{}{} {}", self.palette.fail, self.marks.fail, self.palette.reset, text)
    }

    pub fn heading(&self, text: &str) -> String {
        format!("{}{}{}", self.palette.heading, text, self.palette.reset)
    }

    pub fn detail(&self, text: &str) -> String {
        format!("{}   {}{}", self.palette.detail, text, self.palette.reset)
    }
}

/// Respects `NO_COLOR` (<https://no-color.org/>) and `TERM=dumb`.
#[must_use]
pub fn supports_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if let Ok(term) = std::env::var("TERM") {
        if term.eq_ignore_ascii_case("dumb") {
            return false;
        }
    }
    true
}

/// True when `LANG` or `LC_ALL` advertise UTF-8.
#[must_use]
pub fn supports_unicode() -> bool {
    ["LC_ALL", "LANG"].iter().any(|var| {
        std::env::var(var)
            .map(|value| value.to_uppercase().contains("UTF"))
            .unwrap_or(false)
    })
}
