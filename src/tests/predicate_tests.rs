#![cfg(test)]

use crate::checks::{UNREACHABLE, ZERO_LOSS};
use crate::predicate::{Pattern, Predicate};

const SUMMARY: &str = "BGP router identifier 100.100.1.2, local AS number 100 vrf-id 0\n\
    Neighbor        V         AS   MsgRcvd\n\
    100.100.1.1     4        100        42\n\
    100.100.1.3     4        100        40\n";

#[test]
fn test_conjunction_requires_every_pattern() {
    let both = Predicate::contains_all(["100.100.1.1", "100.100.1.3"]);
    assert!(both.evaluate(SUMMARY));

    let one_missing = Predicate::contains_all(["100.100.1.1", "172.17.1.1"]);
    assert!(!one_missing.evaluate(SUMMARY));
}

#[test]
fn test_inverted_conjunction_holds_unless_all_found() {
    // All present: the conjunction holds, so its inversion fails.
    let inv = Predicate::contains_all(["100.100.1.1", "100.100.1.3"]).inverted();
    assert!(!inv.evaluate(SUMMARY));

    // One absent: the conjunction fails, so its inversion holds.
    let inv = Predicate::contains_all(["100.100.1.1", "192.168.1.0"]).inverted();
    assert!(inv.evaluate(SUMMARY));

    // None present.
    let inv = Predicate::contains_all(["192.168.1.0", "192.168.1.3"]).inverted();
    assert!(inv.evaluate(SUMMARY));
}

#[test]
fn test_empty_conjunction() {
    let empty = Predicate::all_of([]);
    assert!(empty.evaluate(""));
    assert!(!empty.inverted().evaluate(""));
}

#[test]
fn test_address_pattern_respects_boundaries() {
    let p = Pattern::address("100.100.1.1".parse().unwrap());
    assert!(p.is_found(SUMMARY));
    assert!(!p.is_found("100.100.1.10     4   100"));
    assert!(!p.is_found("via 2100.100.1.1"));
    assert!(!p.is_found("via 1.100.100.1.1"));
    assert!(p.is_found("neighbor 100.100.1.1, up"));
    assert!(p.is_found("(100.100.1.1)"));
    // A trailing dot ends a sentence, not an address.
    assert!(p.is_found("peer is 100.100.1.1."));
}

#[test]
fn test_zero_loss_does_not_match_total_loss() {
    let ok = Predicate::matches(ZERO_LOSS).unwrap();
    assert!(ok.evaluate("1 packets transmitted, 1 received, 0% packet loss, time 0ms"));
    assert!(!ok.evaluate("1 packets transmitted, 0 received, 100% packet loss, time 0ms"));
    assert!(!ok.evaluate("10 packets transmitted, 9 received, 10% packet loss"));
}

#[test]
fn test_expect_present_sets_polarity() {
    let p = Predicate::contains(UNREACHABLE).expect_present(false);
    assert!(p.is_inverted());
    assert!(p.evaluate("64 bytes from 100.100.1.1"));
    assert!(!p.evaluate("connect: Network is unreachable"));
    assert!(!Predicate::contains("x").expect_present(true).is_inverted());
}

#[test]
fn test_offending_patterns() {
    let p = Predicate::contains_all(["100.100.1.1", "172.17.1.1", "172.17.3.1"]);
    let missing: Vec<String> = p.offending(SUMMARY).iter().map(|p| p.to_string()).collect();
    assert_eq!(missing, vec!["\"172.17.1.1\"", "\"172.17.3.1\""]);

    let inv = Predicate::contains("100.100.1.3").inverted();
    assert_eq!(inv.offending(SUMMARY).len(), 1);
    assert!(inv.offending("nothing here").is_empty());
}

#[test]
fn test_describe() {
    assert_eq!(
        Predicate::contains("match community").to_string(),
        "contains \"match community\""
    );
    assert_eq!(
        Predicate::contains("redistribute").inverted().to_string(),
        "does not contain \"redistribute\""
    );
    let addrs = Predicate::all_of([
        Pattern::address("10.0.0.1".parse().unwrap()),
        Pattern::address("10.0.0.2".parse().unwrap()),
    ]);
    assert_eq!(addrs.to_string(), "contains all of [10.0.0.1, 10.0.0.2]");
    assert_eq!(
        Predicate::matches(r"nhid \d+").unwrap().inverted().to_string(),
        r"does not contain /nhid \d+/"
    );
}

#[test]
fn test_invalid_regex_is_an_error() {
    assert!(Predicate::matches("(unclosed").is_err());
}
