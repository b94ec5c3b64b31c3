#![cfg(test)]

use std::time::Duration;

use crate::checks::{CheckContext, CheckResult, Expectation, excerpt, run_check};
use crate::fixtures::Protocol;
use crate::poll::RunGuard;
use crate::test_helpers::{FakeNetwork, assignment_two_topology, fast_config, reference_network};

fn check(net: &FakeNetwork, expectation: Expectation) -> CheckResult {
    let topology = assignment_two_topology();
    let config = fast_config();
    let guard = RunGuard::new(Duration::from_secs(60));
    let ctx = CheckContext {
        net,
        topology: &topology,
        config: &config,
        guard: &guard,
    };
    run_check(&expectation, &ctx)
}

#[test]
fn test_protocol_activity() {
    let net = reference_network();
    let rip_on = |node: &str, active| Expectation::Protocol {
        node: node.into(),
        protocol: Protocol::Rip,
        active,
    };

    assert!(check(&net, rip_on("r110", true)).passed);
    assert!(check(&net, rip_on("r210", false)).passed);

    let wrong = check(&net, rip_on("r210", true));
    assert!(!wrong.passed);
    assert!(wrong.diagnostics[0].contains("(r210) rip should be active"));

    let wrong = check(&net, rip_on("r120", false));
    assert!(!wrong.passed);
    assert!(wrong.diagnostics[0].contains("should not be active"));
}

#[test]
fn test_daemon_not_running_counts_as_inactive() {
    let net = FakeNetwork::new(["r1"]).on("r1", "show ip rip", "ripd is not running\n");
    let result = check(
        &net,
        Expectation::Protocol {
            node: "r1".into(),
            protocol: Protocol::Rip,
            active: false,
        },
    );
    assert!(result.passed, "{:?}", result.diagnostics);
}

#[test]
fn test_asn_is_matched_as_a_whole_number() {
    let net = FakeNetwork::new(["r1"]).on(
        "r1",
        "show bgp summary",
        "BGP router identifier 1.1.1.1, local AS number 1000 vrf-id 0\n",
    );
    assert!(!check(&net, Expectation::Asn { node: "r1".into(), asn: 100 }).passed);
    assert!(check(&net, Expectation::Asn { node: "r1".into(), asn: 1000 }).passed);
}

#[test]
fn test_neighbours_include_and_exclude() {
    let net = reference_network();
    let ok = check(
        &net,
        Expectation::Neighbors {
            node: "r120".into(),
            include: vec!["100.100.1.1".parse().unwrap(), "100.100.1.3".parse().unwrap()],
            exclude: vec!["192.168.1.0".parse().unwrap(), "192.168.1.3".parse().unwrap()],
        },
    );
    assert!(ok.passed, "{:?}", ok.diagnostics);

    // One of two excluded addresses present: the conjunction is not met.
    let partial = check(
        &net,
        Expectation::Neighbors {
            node: "r120".into(),
            include: vec!["100.100.1.1".parse().unwrap()],
            exclude: vec!["100.100.1.3".parse().unwrap(), "192.168.1.3".parse().unwrap()],
        },
    );
    assert!(partial.passed, "{:?}", partial.diagnostics);

    // Every excluded address present, and one included one missing.
    let bad = check(
        &net,
        Expectation::Neighbors {
            node: "r120".into(),
            include: vec!["100.100.1.1".parse().unwrap(), "172.17.1.1".parse().unwrap()],
            exclude: vec!["100.100.1.1".parse().unwrap(), "100.100.1.3".parse().unwrap()],
        },
    );
    assert!(!bad.passed);
    assert_eq!(bad.diagnostics.len(), 2);
    assert!(bad.diagnostics[0].contains("(missing 172.17.1.1)"));
    assert!(bad.diagnostics[1].contains("does not contain all of [100.100.1.1, 100.100.1.3]"));
}

#[test]
fn test_single_excluded_neighbour_is_tolerated() {
    let net = FakeNetwork::new(["r120"]).on(
        "r120",
        "show bgp summary",
        "BGP router identifier 100.100.1.2, local AS number 100 vrf-id 0\n\
         100.100.1.1     4        100        42        40       12    0    0 00:01:07            3        6 N/A\n\
         100.100.1.3     4        100        42        40       12    0    0 00:01:07            3        6 N/A\n\
         192.168.1.0     4        100        42        40       12    0    0 00:01:07            3        6 N/A\n",
    );
    let peers = |exclude: &[&str]| Expectation::Neighbors {
        node: "r120".into(),
        include: vec!["100.100.1.1".parse().unwrap(), "100.100.1.3".parse().unwrap()],
        exclude: exclude.iter().map(|a| a.parse().unwrap()).collect(),
    };

    let result = check(&net, peers(&["192.168.1.0", "192.168.1.3"]));
    assert!(result.passed, "{:?}", result.diagnostics);

    let result = check(&net, peers(&["192.168.1.0"]));
    assert!(!result.passed);
    assert!(result.diagnostics[0].contains("does not contain 192.168.1.0"));
}

#[test]
fn test_ping_expectations() {
    let net = reference_network();
    let ping = |source: &str, target: &str, reachable| Expectation::Ping {
        source: source.into(),
        target: target.parse().unwrap(),
        reachable,
    };
    assert!(check(&net, ping("r110", "100.100.1.2", true)).passed);
    assert!(check(&net, ping("r210", "100.100.1.1", false)).passed);

    let leaked = check(&net, ping("r110", "100.100.1.2", false));
    assert!(!leaked.passed);
    assert!(leaked.diagnostics[0].contains("should fail to ping 100.100.1.2"));

    let lost = FakeNetwork::new(["r1"]).on("r1", "ping", crate::test_helpers::ping_lost());
    let result = check(&lost, ping("r1", "10.0.0.1", true));
    assert!(!result.passed);
    assert!(result.diagnostics[0].contains("100% packet loss"));
}

#[test]
fn test_match_community_only_on_r110_and_r130() {
    let net = reference_network();
    for (node, required) in [
        ("r110", true),
        ("r130", true),
        ("r120", false),
        ("r210", false),
        ("r310", false),
        ("r410", false),
    ] {
        let result = check(
            &net,
            Expectation::Directive {
                node: node.into(),
                directive: "match community".into(),
                required,
            },
        );
        assert!(result.passed, "{node}: {:?}", result.diagnostics);
    }

    let offender = FakeNetwork::new(["r210"]).on(
        "r210",
        "show running-config",
        "route-map X permit 10\n match community 5\n",
    );
    let result = check(
        &offender,
        Expectation::Directive {
            node: "r210".into(),
            directive: "match community".into(),
            required: false,
        },
    );
    assert!(!result.passed);
    assert!(result.diagnostics[0].starts_with("(r210) uses match community"));
}

#[test]
fn test_command_failure_is_a_failed_check() {
    let net = FakeNetwork::new(["r1"]).failing("r1", "show bgp summary", "timed out after 20s");
    let result = check(&net, Expectation::Asn { node: "r1".into(), asn: 100 });
    assert!(!result.passed);
    assert!(result.diagnostics[0].contains("command failed: timed out after 20s"));

    let unknown = check(&net, Expectation::Asn { node: "r9".into(), asn: 100 });
    assert!(!unknown.passed);
    assert!(unknown.diagnostics[0].contains("no such node 'r9'"));
}

#[test]
fn test_traceroute_expectation() {
    let net = reference_network();
    let via = |hop: &str| Expectation::Traceroute {
        source: "r410".into(),
        target: "192.168.1.1".parse().unwrap(),
        via: hop.parse().unwrap(),
    };
    assert!(check(&net, via("172.17.3.0")).passed);
    assert!(!check(&net, via("172.17.4.0")).passed);
}

#[test]
fn test_guard_stops_checks_before_running() {
    let net = reference_network();
    let topology = assignment_two_topology();
    let config = fast_config();
    let guard = RunGuard::new(Duration::from_secs(60));
    guard.cancel();
    let ctx = CheckContext {
        net: &net,
        topology: &topology,
        config: &config,
        guard: &guard,
    };
    let result = run_check(&Expectation::Asn { node: "r110".into(), asn: 100 }, &ctx);
    assert!(!result.passed);
    assert_eq!(result.diagnostics, vec!["not run: interrupted".to_string()]);
    assert!(net.calls().is_empty());
}

#[test]
fn test_aggregate_keeps_every_diagnostic() {
    let agg = CheckResult::aggregate(
        "Route",
        [
            CheckResult::pass("a"),
            CheckResult::fail("b", "first"),
            CheckResult::fail("c", "second"),
        ],
    );
    assert!(!agg.passed);
    assert_eq!(agg.name, "Route");
    assert_eq!(agg.diagnostics, vec!["first", "second"]);
    assert!(CheckResult::aggregate("empty", []).passed);
}

#[test]
fn test_excerpt_is_short() {
    assert_eq!(excerpt("  \n"), "no output");
    let long: String = (0..20).map(|i| format!("line {i}\n")).collect();
    let e = excerpt(&long);
    assert!(e.starts_with("line 0 | line 1"));
    assert!(e.ends_with("| ..."));
}
