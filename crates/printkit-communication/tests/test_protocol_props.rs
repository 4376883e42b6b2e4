//! Property tests for the wire protocol primitives.

use printkit_communication::{checksum, classify, format_numbered, Reply};
use proptest::prelude::*;

proptest! {
    /// The checksum is a pure function of the prefix string.
    #[test]
    fn checksum_is_deterministic(s in ".*") {
        prop_assert_eq!(checksum(&s), checksum(&s));
    }

    /// It is exactly the XOR fold of the prefix bytes.
    #[test]
    fn checksum_matches_reference_fold(s in ".*") {
        let reference = s.bytes().fold(0u8, |acc, b| acc ^ b);
        prop_assert_eq!(checksum(&s), reference);
    }

    /// Every framed line is `N<n> <cmd>*<cs>` with a checksum that verifies
    /// against everything before the `*`.
    #[test]
    fn framing_invariant(lineno in 0u32..1_000_000, cmd in "[A-Z][A-Z0-9 .-]{0,30}") {
        let framed = format_numbered(lineno, &cmd);
        let (prefix, cs) = framed.rsplit_once('*').expect("one separator");
        let has_prefix = prefix.starts_with(&format!("N{} ", lineno));
        prop_assert!(has_prefix);
        prop_assert_eq!(&prefix[prefix.find(' ').unwrap() + 1..], cmd.as_str());
        prop_assert_eq!(cs.parse::<u8>().expect("decimal"), checksum(prefix));
    }

    /// Resend requests with a leading index always classify with that index.
    #[test]
    fn resend_index_extraction(n in 0u32..100_000) {
        prop_assert_eq!(classify(&format!("Resend:{n}")), Reply::Resend(Some(n)));
        prop_assert_eq!(classify(&format!("rs N{n} Expected checksum 67")), Reply::Resend(Some(n)));
    }

    /// An `ok` with arbitrary trailing junk still acknowledges.
    #[test]
    fn ok_prefix_always_acknowledges(suffix in "[ A-Za-z0-9:./]{0,40}") {
        let line = format!("ok{suffix}");
        let is_ok = matches!(classify(&line), Reply::Ok { .. });
        prop_assert!(is_ok);
    }
}
