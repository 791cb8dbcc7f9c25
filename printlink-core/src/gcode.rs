//! Syntax check for embedded G-code lines.
//!
//! Only the shape of a line is checked: a `G`/`M` word followed by
//! single-letter parameters with optionally negative, optionally fractional
//! values. Whether the command makes sense for the current machine state is
//! left to the firmware.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{PrinterError, Result};

fn command_word() -> &'static Regex {
    static COMMAND_REGEX: OnceLock<Regex> = OnceLock::new();
    COMMAND_REGEX.get_or_init(|| Regex::new(r"^[GM]\d+").expect("invalid regex pattern"))
}

fn parameter_word() -> &'static Regex {
    static PARAM_REGEX: OnceLock<Regex> = OnceLock::new();
    PARAM_REGEX.get_or_init(|| Regex::new(r"^[A-Z]-?\d+(\.\d+)?$").expect("invalid regex pattern"))
}

/// Strip the trailing `;` comment and surrounding whitespace.
pub fn strip_comment(line: &str) -> &str {
    line.split(';').next().unwrap_or_default().trim()
}

/// Returns true if `line` is a syntactically valid G-code command.
pub fn is_valid_gcode(line: &str) -> bool {
    let line = strip_comment(line);
    if line.is_empty() || !command_word().is_match(line) {
        return false;
    }

    line.split_whitespace()
        .skip(1)
        .all(|token| parameter_word().is_match(token))
}

/// Validate every line, failing on the first invalid one.
pub fn validate_lines<S: AsRef<str>>(lines: &[S]) -> Result<()> {
    if lines.is_empty() {
        return Err(PrinterError::InvalidCommand("no G-code lines given".into()));
    }
    for line in lines {
        let line = line.as_ref();
        if !is_valid_gcode(line) {
            return Err(PrinterError::InvalidCommand(format!(
                "invalid G-code line: {line:?}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_motion_with_signed_fractional_params() {
        assert!(is_valid_gcode("G1 X10 Y-5.5"));
        assert!(is_valid_gcode("G28"));
        assert!(is_valid_gcode("M106 P1 S255"));
    }

    #[test]
    fn strips_trailing_comment() {
        assert!(is_valid_gcode("M104 S200 ; set temp"));
        assert_eq!(strip_comment("  G90 ; absolute "), "G90");
    }

    #[test]
    fn rejects_glued_or_malformed_tokens() {
        assert!(!is_valid_gcode("G1 X10Y5"));
        assert!(!is_valid_gcode("G1 x10"));
        assert!(!is_valid_gcode("G1 X1.5.2"));
        assert!(!is_valid_gcode("G1 X.5"));
        assert!(!is_valid_gcode("T1"));
    }

    #[test]
    fn rejects_empty_and_comment_only() {
        assert!(!is_valid_gcode(""));
        assert!(!is_valid_gcode("   "));
        assert!(!is_valid_gcode("; comment only"));
    }

    #[test]
    fn validate_lines_is_all_or_nothing() {
        assert!(validate_lines(&["G90", "G0 Z10"]).is_ok());
        let err = validate_lines(&["G90", "G0 Z10 bad"]).unwrap_err();
        assert!(matches!(err, PrinterError::InvalidCommand(_)));
        assert!(validate_lines::<&str>(&[]).is_err());
    }
}
