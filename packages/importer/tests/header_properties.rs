//! Property tests for column naming.
//!
//! Any header cell must map to a bounded, deterministic column name made of
//! `[a-z0-9_]`, and duplicate detection must agree with the names produced.

use std::collections::HashSet;

use importer::header::{MAX_COLUMN_LENGTH, assert_unique, column_name, sanitize_header, truncate_header};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn column_names_are_bounded_and_deterministic(raw in any::<String>()) {
        let name = column_name(&raw);
        prop_assert!(name.len() <= MAX_COLUMN_LENGTH, "{} is {} bytes", name, name.len());
        prop_assert_eq!(&name, &column_name(&raw));
        prop_assert!(
            name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
            "unexpected character in {}",
            name
        );
    }

    #[test]
    fn truncation_is_bounded_for_any_input(raw in any::<String>()) {
        let truncated = truncate_header(&raw);
        prop_assert!(truncated.len() <= MAX_COLUMN_LENGTH);
        prop_assert_eq!(truncated, truncate_header(&raw));
    }

    #[test]
    fn long_names_keep_their_prefix(raw in "[a-z_]{65,200}") {
        let truncated = truncate_header(&raw);
        prop_assert_eq!(truncated.len(), MAX_COLUMN_LENGTH);
        prop_assert!(raw.starts_with(&truncated[..MAX_COLUMN_LENGTH - 5]));
        let digest = format!("{:x}", md5::compute(raw.as_bytes()));
        prop_assert!(truncated.ends_with(&digest[..4]));
    }

    #[test]
    fn sanitizing_twice_changes_nothing(raw in "[ A-Za-z0-9_\n$()-]{0,80}") {
        let once = sanitize_header(&raw);
        prop_assert_eq!(sanitize_header(&once), once);
    }

    #[test]
    fn duplicates_are_reported_exactly_when_names_collide(
        headers in prop::collection::vec("[A-Ca-c ]{1,3}", 1..8),
    ) {
        let names: Vec<String> = headers.iter().map(|h| column_name(h)).collect();
        let distinct: HashSet<&String> = names.iter().collect();

        match assert_unique(&names) {
            Ok(()) => prop_assert_eq!(distinct.len(), names.len()),
            Err(message) => {
                prop_assert!(distinct.len() < names.len());
                let listed = message
                    .strip_prefix("Duplicate headers error: ")
                    .ok_or_else(|| TestCaseError::fail(format!("unexpected message {message}")))?;
                let listed: Vec<&str> = listed.split(", ").collect();
                let unique_listed: HashSet<&&str> = listed.iter().collect();
                prop_assert_eq!(unique_listed.len(), listed.len());
                for name in listed {
                    prop_assert!(names.iter().filter(|n| n.as_str() == name).count() > 1);
                }
            }
        }
    }
}
