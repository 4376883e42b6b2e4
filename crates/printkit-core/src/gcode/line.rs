//! Single G-code line parsing
//!
//! Tokenises one line of G-code into a command word and its numeric
//! parameters. Comments (`;` to end of line, parenthesised blocks) are
//! ignored by the tokenizer; host commands (`;@pause` and friends) are
//! surfaced with an `@`-prefixed command so callers can intercept them.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// Commands that move the tool head.
const MOVE_COMMANDS: [&str; 4] = ["G0", "G1", "G2", "G3"];

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\([^()]*\)|;.*|([gmtnxyzefij])([-+]?[0-9]*\.?[0-9]*)")
            .expect("word pattern compiles")
    })
}

fn comment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\([^()]*\)|;.*").expect("comment pattern compiles"))
}

/// Strip G-code comments (`;…` and `(...)`) and surrounding whitespace.
pub fn strip_comments(line: &str) -> String {
    comment_pattern().replace_all(line, "").trim().to_string()
}

/// One parsed line of G-code.
///
/// `raw` always holds the original text. `command` is the uppercased command
/// word (`G1`, `M105`, `T0`), or an `@`-prefixed name for host commands, or
/// `None` for comment/blank lines. Numeric parameters are only populated for
/// G-words, scaled to millimetres when the surrounding program is in inch
/// mode. The modal flags (`imperial`, `relative`, `relative_e`) describe the
/// program state this line executes under and are filled in by
/// [`GCode`](super::GCode).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GLine {
    /// Original line text, unmodified.
    pub raw: String,
    /// Uppercased command word, if the line has one.
    pub command: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub e: Option<f64>,
    pub f: Option<f64>,
    pub i: Option<f64>,
    pub j: Option<f64>,
    /// Line was parsed under G20 (inch) mode; parameters are already in mm.
    pub imperial: bool,
    /// Line executes under G91 relative positioning.
    pub relative: bool,
    /// Extrusion is relative (G91 or M83).
    pub relative_e: bool,
    /// Command is one of G0/G1/G2/G3.
    pub is_move: bool,
}

impl GLine {
    /// Parse a line with no modal context (absolute, metric).
    pub fn parse(raw: &str) -> Self {
        Self::parse_with_units(raw, false)
    }

    /// Parse a line, scaling parameters by 25.4 when `imperial` is set.
    pub fn parse_with_units(raw: &str, imperial: bool) -> Self {
        let mut line = GLine {
            raw: raw.to_string(),
            imperial,
            ..Default::default()
        };

        if let Some(rest) = raw.trim_start().strip_prefix(";@") {
            let name = rest.split_whitespace().next().unwrap_or("");
            if !name.is_empty() {
                line.command = Some(format!("@{name}"));
            }
            return line;
        }

        let unit_factor = if imperial { 25.4 } else { 1.0 };
        for caps in word_pattern().captures_iter(raw) {
            let (letter, value) = match (caps.get(1), caps.get(2)) {
                (Some(l), Some(v)) => (l.as_str(), v.as_str()),
                _ => continue, // comment token
            };
            let letter = letter.to_ascii_lowercase();
            if line.command.is_none() {
                // The first word that is not a line number names the command.
                if letter != "n" {
                    line.command = Some(format!("{}{}", letter.to_ascii_uppercase(), value));
                }
                continue;
            }
            let parsed: Option<f64> = value.parse().ok();
            let Some(v) = parsed else { continue };
            let v = v * unit_factor;
            match letter.as_str() {
                "x" => line.x = Some(v),
                "y" => line.y = Some(v),
                "z" => line.z = Some(v),
                "e" => line.e = Some(v),
                "f" => line.f = Some(v),
                "i" => line.i = Some(v),
                "j" => line.j = Some(v),
                _ => {}
            }
        }

        // Parameters only carry meaning on G-words; M-codes reuse the same
        // letters for unrelated purposes (e.g. M220 S factors).
        if let Some(cmd) = &line.command {
            line.is_move = MOVE_COMMANDS.contains(&cmd.as_str());
            if !cmd.starts_with('G') {
                line.x = None;
                line.y = None;
                line.z = None;
                line.e = None;
                line.f = None;
                line.i = None;
                line.j = None;
            }
        }

        line
    }

    /// True when the line carries nothing to transmit (blank or comment).
    pub fn is_comment_or_empty(&self) -> bool {
        strip_comments(&self.raw).is_empty()
    }

    /// True for host commands such as `;@pause`.
    pub fn is_host_command(&self) -> bool {
        self.raw.trim_start().starts_with(";@")
    }
}

impl fmt::Display for GLine {
    /// Render the significant fields back to a canonical line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(cmd) = &self.command else {
            return write!(f, "{}", self.raw.trim());
        };
        write!(f, "{cmd}")?;
        for (letter, value) in [
            ('X', self.x),
            ('Y', self.y),
            ('Z', self.z),
            ('E', self.e),
            ('F', self.f),
            ('I', self.i),
            ('J', self.j),
        ] {
            if let Some(v) = value {
                write!(f, " {letter}{v}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_move_with_parameters() {
        let line = GLine::parse("G1 X10 Y-2.5 E0.8 F3000");
        assert_eq!(line.command.as_deref(), Some("G1"));
        assert!(line.is_move);
        assert_eq!(line.x, Some(10.0));
        assert_eq!(line.y, Some(-2.5));
        assert_eq!(line.e, Some(0.8));
        assert_eq!(line.f, Some(3000.0));
        assert_eq!(line.z, None);
    }

    #[test]
    fn uppercases_command_word() {
        let line = GLine::parse("g28 x0 y0");
        assert_eq!(line.command.as_deref(), Some("G28"));
    }

    #[test]
    fn skips_line_number_word() {
        let line = GLine::parse("N42 G1 X5");
        assert_eq!(line.command.as_deref(), Some("G1"));
        assert_eq!(line.x, Some(5.0));
    }

    #[test]
    fn m_codes_carry_no_coordinates() {
        let line = GLine::parse("M220 X50");
        assert_eq!(line.command.as_deref(), Some("M220"));
        assert_eq!(line.x, None);
        assert!(!line.is_move);
    }

    #[test]
    fn comment_lines_have_no_command() {
        for raw in ["; layer 1", "(home all)", "", "   "] {
            let line = GLine::parse(raw);
            assert_eq!(line.command, None, "raw = {raw:?}");
            assert!(line.is_comment_or_empty());
        }
    }

    #[test]
    fn inline_comment_is_ignored() {
        let line = GLine::parse("G1 X1 ; move (really)");
        assert_eq!(line.x, Some(1.0));
        assert_eq!(line.y, None);
        assert!(!line.is_comment_or_empty());
    }

    #[test]
    fn host_command_gets_at_prefix() {
        let line = GLine::parse(";@pause");
        assert_eq!(line.command.as_deref(), Some("@pause"));
        assert!(line.is_host_command());
        assert!(line.is_comment_or_empty());
    }

    #[test]
    fn imperial_scales_to_millimetres() {
        let line = GLine::parse_with_units("G1 X1", true);
        assert_eq!(line.x, Some(25.4));
    }

    #[test]
    fn arc_offsets_parse() {
        let line = GLine::parse("G2 X10 Y0 I5 J0");
        assert_eq!(line.i, Some(5.0));
        assert_eq!(line.j, Some(0.0));
    }

    #[test]
    fn strip_comments_removes_both_styles() {
        assert_eq!(strip_comments("G1 X1 ; hi"), "G1 X1");
        assert_eq!(strip_comments("G1 (wait) X1"), "G1  X1".trim());
        assert_eq!(strip_comments(";@pause"), "");
    }

    #[test]
    fn display_round_trips_significant_fields() {
        let original = GLine::parse("G1   X10.5  Y2 E0.75 F1800");
        let reparsed = GLine::parse(&original.to_string());
        assert_eq!(reparsed.command, original.command);
        assert_eq!(reparsed.x, original.x);
        assert_eq!(reparsed.y, original.y);
        assert_eq!(reparsed.z, original.z);
        assert_eq!(reparsed.e, original.e);
        assert_eq!(reparsed.f, original.f);
    }
}
