use proptest::prelude::*;
use rulescan::Version;

fn dotted(parts: &[u64]) -> String {
    parts
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

#[test]
fn minor_ten_is_newer_than_minor_nine() {
    let mut versions: Vec<Version> = ["1.10", "1.9", "1.2", "2", "1.9.1"]
        .iter()
        .map(|raw| raw.parse().expect("version"))
        .collect();
    versions.sort();
    let ordered: Vec<&str> = versions.iter().map(Version::as_str).collect();
    assert_eq!(ordered, vec!["1.2", "1.9", "1.9.1", "1.10", "2"]);
}

#[test]
fn serializes_as_plain_text() {
    let version: Version = "6.5".parse().expect("version");
    assert_eq!(serde_json::to_string(&version).expect("json"), "\"6.5\"");
    let back: Version = serde_json::from_str("\"6.5\"").expect("json");
    assert_eq!(back, version);
    assert!(serde_json::from_str::<Version>("\"6.x\"").is_err());
}

proptest! {
    #[test]
    fn parses_any_dotted_integer_sequence(parts in prop::collection::vec(0u64..10_000, 1..5)) {
        let version = Version::parse(&dotted(&parts)).expect("version");
        prop_assert_eq!(version.key(), parts.as_slice());
    }

    #[test]
    fn order_follows_the_numeric_tuple(
        a in prop::collection::vec(0u64..50, 1..4),
        b in prop::collection::vec(0u64..50, 1..4),
    ) {
        let va = Version::parse(&dotted(&a)).expect("version");
        let vb = Version::parse(&dotted(&b)).expect("version");
        prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
    }

    #[test]
    fn file_stem_suffix_is_the_version(prefix in "[A-Za-z][A-Za-z ]{0,12}", parts in prop::collection::vec(0u64..100, 1..4)) {
        let stem = format!("{prefix}_{}", dotted(&parts));
        let version = Version::from_file_stem(&stem).expect("suffix");
        prop_assert_eq!(version.key(), parts.as_slice());
    }
}
