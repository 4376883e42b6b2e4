//! Line protocol primitives
//!
//! The reprap host protocol frames each main-queue command as
//! `N<lineno> <command>*<checksum>\n`, where the checksum is the XOR of the
//! bytes of everything before the `*`. Firmware replies are line-oriented
//! ASCII; [`classify`] sorts them into the handful of kinds the engine
//! reacts to.

/// XOR of the ASCII bytes of a line's prefix (everything before the `*`).
pub fn checksum(prefix: &str) -> u8 {
    prefix.bytes().fold(0, |acc, b| acc ^ b)
}

/// Frame a command with a line number and checksum: `N<n> <command>*<cs>`.
pub fn format_numbered(lineno: u32, command: &str) -> String {
    let prefix = format!("N{lineno} {command}");
    let cs = checksum(&prefix);
    format!("{prefix}*{cs}")
}

/// The command that resets the firmware's expected line number.
pub const LINENO_RESET: &str = "M110 N-1";

/// The lineno-reset line as transmitted: checksummed over its own text,
/// never numbered, never cached.
pub fn format_lineno_reset() -> String {
    format!("{LINENO_RESET}*{}", checksum(LINENO_RESET))
}

/// Firmware banners that mean "I just booted".
const GREETINGS: [&str; 2] = ["start", "Grbl "];

/// A classified firmware reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Boot banner (`start`, `Grbl …`).
    Greeting,
    /// Acknowledgment, possibly with a temperature echo appended.
    Ok { has_temp: bool },
    /// Unsolicited temperature report (`T:…` / `B:…`).
    Temp,
    /// Replay request; `None` when no line number could be extracted.
    Resend(Option<u32>),
    /// Firmware diagnostic (`Error:…`).
    Error,
    /// Firmware debug chatter, swallowed without side effects.
    Debug,
    /// Anything else; an opaque log line.
    Other,
}

/// Classify one decoded reply line.
pub fn classify(line: &str) -> Reply {
    if GREETINGS.iter().any(|g| line.starts_with(g)) {
        return Reply::Greeting;
    }
    if line.starts_with("ok") {
        let has_temp = line.contains("T:") || line.contains("B:");
        return Reply::Ok { has_temp };
    }
    if line.starts_with("T:") || line.starts_with("B:") {
        return Reply::Temp;
    }
    let lowered = line.to_ascii_lowercase();
    if lowered.starts_with("resend") || lowered.starts_with("rs") {
        return Reply::Resend(parse_resend_index(line));
    }
    if line.starts_with("Error") {
        return Reply::Error;
    }
    if line.starts_with("DEBUG_") {
        return Reply::Debug;
    }
    Reply::Other
}

/// Extract the line number from a resend request.
///
/// Firmwares disagree on the exact shape (`Resend:1`, `Resend: N:3`,
/// `rs N2 Expected checksum 67`), so strip the `N`/`:` noise and take the
/// first token that parses as an integer.
fn parse_resend_index(line: &str) -> Option<u32> {
    line.replace("N:", " ")
        .replace(['N', ':'], " ")
        .split_whitespace()
        .find_map(|token| token.parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_reference_loop() {
        // The reference is a plain XOR fold over the bytes.
        for prefix in ["N0 G28", "N130 M110", "M110 N-1", ""] {
            let mut reference = 0u8;
            for b in prefix.bytes() {
                reference ^= b;
            }
            assert_eq!(checksum(prefix), reference, "prefix = {prefix:?}");
        }
    }

    #[test]
    fn checksum_known_values() {
        assert_eq!(checksum("N0 G28"), 19);
        assert_eq!(checksum("N130 M110"), 33);
        assert_eq!(checksum("N3 T0"), 57);
    }

    #[test]
    fn numbered_line_format() {
        assert_eq!(format_numbered(0, "G28"), "N0 G28*19");
        assert_eq!(format_numbered(3, "T0"), "N3 T0*57");
    }

    #[test]
    fn lineno_reset_is_checksummed_over_its_own_text() {
        let line = format_lineno_reset();
        let (prefix, cs) = line.split_once('*').expect("has checksum");
        assert_eq!(prefix, "M110 N-1");
        assert_eq!(cs.parse::<u8>().unwrap(), checksum(prefix));
    }

    #[test]
    fn classifies_greetings() {
        assert_eq!(classify("start"), Reply::Greeting);
        assert_eq!(classify("Grbl 1.1f ['$' for help]"), Reply::Greeting);
    }

    #[test]
    fn classifies_ok_with_and_without_temp() {
        assert_eq!(classify("ok"), Reply::Ok { has_temp: false });
        assert_eq!(
            classify("ok T:210.3 /210.0 B:60.1 /60.0"),
            Reply::Ok { has_temp: true }
        );
    }

    #[test]
    fn classifies_unsolicited_temperature() {
        assert_eq!(classify("T:25.6 /0.0 B:24.9 /0.0"), Reply::Temp);
        assert_eq!(classify("B:60.0 /60.0"), Reply::Temp);
    }

    #[test]
    fn classifies_resend_variants() {
        assert_eq!(classify("Resend:1"), Reply::Resend(Some(1)));
        assert_eq!(classify("Resend: 12"), Reply::Resend(Some(12)));
        // Teacup's shape.
        assert_eq!(classify("rs N2 Expected checksum 67"), Reply::Resend(Some(2)));
        assert_eq!(classify("RESEND: N:3"), Reply::Resend(Some(3)));
        assert_eq!(classify("Resend: bogus"), Reply::Resend(None));
    }

    #[test]
    fn classifies_error_and_debug() {
        assert_eq!(classify("Error:checksum mismatch, Last Line: 7"), Reply::Error);
        assert_eq!(classify("DEBUG_ echo"), Reply::Debug);
    }

    #[test]
    fn everything_else_is_opaque() {
        assert_eq!(classify("echo:busy: processing"), Reply::Other);
        assert_eq!(classify("FIRMWARE_NAME:Marlin"), Reply::Other);
    }
}
