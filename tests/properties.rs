mod common;

use std::collections::{BTreeMap, HashSet};

use common::parent_child_schema;
use proptest::prelude::*;
use relsplit::{FieldValue, Fingerprint, FlatRecord, NormalizeOptions, Normalizer, value::record};

fn cell() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[a-c]{0,2}")
}

fn pair_records() -> impl Strategy<Value = Vec<(Option<String>, Option<String>)>> {
    proptest::collection::vec((cell(), cell()), 0..24)
}

fn to_records(pairs: &[(Option<String>, Option<String>)]) -> Vec<FlatRecord> {
    pairs
        .iter()
        .map(|(p, c)| {
            record([
                ("p", FieldValue::from(p.clone())),
                ("c", FieldValue::from(c.clone())),
            ])
        })
        .collect()
}

fn canonical(value: &Option<String>) -> Option<String> {
    value.clone().filter(|text| !text.is_empty())
}

fn identifiers(tables: &relsplit::NormalizedTables, name: &str) -> HashSet<Fingerprint> {
    tables
        .rows(name)
        .expect("table present")
        .iter()
        .map(|row| row.identifier)
        .collect()
}

proptest! {
    #[test]
    fn content_fingerprint_ignores_pair_order(
        content in proptest::collection::btree_map("[a-z]{1,6}", cell(), 0..8)
    ) {
        let forward = Fingerprint::of_content(
            content.iter().map(|(k, v)| (k.as_str(), v.as_deref())),
        );
        let backward = Fingerprint::of_content(
            content.iter().rev().map(|(k, v)| (k.as_str(), v.as_deref())),
        );
        let as_map: BTreeMap<&str, Option<&str>> =
            content.iter().map(|(k, v)| (k.as_str(), v.as_deref())).collect();
        prop_assert_eq!(forward, backward);
        prop_assert_eq!(forward, relsplit::fingerprint::fingerprint(&as_map));
    }

    #[test]
    fn normalizing_twice_gives_identical_output(pairs in pair_records()) {
        let records = to_records(&pairs);
        let normalizer = Normalizer::new(parent_child_schema(), NormalizeOptions::default());
        let first = normalizer.normalize(&records).expect("first run");
        let second = normalizer.normalize(&records).expect("second run");
        prop_assert_eq!(first, second);
    }

    #[test]
    fn row_sets_do_not_depend_on_record_order(pairs in pair_records()) {
        let normalizer = Normalizer::new(parent_child_schema(), NormalizeOptions::default());
        let forward = normalizer.normalize(&to_records(&pairs)).expect("forward");
        let mut reversed_pairs = pairs.clone();
        reversed_pairs.reverse();
        let reversed = normalizer.normalize(&to_records(&reversed_pairs)).expect("reversed");
        prop_assert_eq!(identifiers(&forward, "parent"), identifiers(&reversed, "parent"));
        prop_assert_eq!(identifiers(&forward, "child"), identifiers(&reversed, "child"));
    }

    #[test]
    fn row_counts_match_distinct_content_and_context(pairs in pair_records()) {
        let out = Normalizer::new(parent_child_schema(), NormalizeOptions::default())
            .normalize(&to_records(&pairs))
            .expect("normalize");
        let parents = pairs.iter().map(|(p, _)| canonical(p)).collect::<HashSet<_>>();
        let children = pairs
            .iter()
            .map(|(p, c)| (canonical(p), canonical(c)))
            .collect::<HashSet<_>>();
        prop_assert_eq!(out.rows("parent").unwrap().len(), parents.len());
        prop_assert_eq!(out.rows("child").unwrap().len(), children.len());

        let parent_ids = identifiers(&out, "parent");
        for child in out.rows("child").unwrap() {
            prop_assert!(parent_ids.contains(&child.foreign_keys[0]));
        }
    }
}
