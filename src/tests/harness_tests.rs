#![cfg(test)]

use std::time::Duration;

use crate::checks::CheckResult;
use crate::fixtures::Fixtures;
use crate::harness::{
    EXIT_ABORTED, EXIT_FAILED, EXIT_PASSED, EXIT_TOPOLOGY_MISMATCH, Grade, Suite, grade_network,
    grade_suite,
};
use crate::poll::RunGuard;
use crate::test_helpers::{assignment_two_topology, fast_config, reference_network};

const SECTIONS: [&str; 8] = [
    "Protocol",
    "ASN",
    "Connectivity",
    "Neighbour",
    "Fault tolerance",
    "Metric value",
    "Route",
    "Restricted commands",
];

#[test]
fn test_suite_sections_in_grading_order() {
    let suite = Suite::from_fixtures(&Fixtures::assignment_two(), &assignment_two_topology());
    let names: Vec<&str> = suite.sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, SECTIONS);

    let sizes: Vec<usize> = suite.sections.iter().map(|s| s.expectations.len()).collect();
    // 6 routers x 2 protocols; ping-all + 6 + 12 pings; 6 routers x 6 directives.
    assert_eq!(sizes, vec![12, 6, 19, 6, 1, 4, 6, 36]);
}

#[test]
fn test_grade_suite_names_only_the_failure() {
    let mut results: Vec<CheckResult> = SECTIONS.iter().map(|s| CheckResult::pass(*s)).collect();
    assert_eq!(grade_suite(&results), Grade::Passed);
    assert_eq!(grade_suite(&results).exit_code(), EXIT_PASSED);

    results[6] = CheckResult::fail("Route", "(r120) route to 10.4.1.0/25 does not pass through r110");
    let grade = grade_suite(&results);
    assert_eq!(
        grade,
        Grade::Failed {
            failed: vec!["Route".into()]
        }
    );
    assert_eq!(grade.exit_code(), EXIT_FAILED);
}

#[test]
fn test_reference_network_passes_and_is_repeatable() {
    let net = reference_network();
    let topology = assignment_two_topology();
    let fixtures = Fixtures::assignment_two();
    let config = fast_config();
    let guard = RunGuard::new(Duration::from_secs(60));

    let first = grade_network(&net, &topology, &fixtures, &config, &guard);
    let failures: Vec<_> = first.results.iter().filter(|r| !r.passed).collect();
    assert_eq!(first.grade, Grade::Passed, "{failures:#?}");
    assert_eq!(first.results.len(), 9);
    assert_eq!(first.results[0].name, "Topology");
    assert!(net.is_link_up("r110", "r410"));

    let second = grade_network(&net, &topology, &fixtures, &config, &guard);
    assert_eq!(second, first);
}

#[test]
fn test_topology_mismatch_short_circuits() {
    let mut fixtures = Fixtures::assignment_two();
    fixtures.hosts[0]
        .interfaces
        .insert("h211-eth0".into(), "10.2.1.2/24".parse().unwrap());

    let net = reference_network();
    let before = net.calls().len();
    let outcome = grade_network(
        &net,
        &assignment_two_topology(),
        &fixtures,
        &fast_config(),
        &RunGuard::new(Duration::from_secs(60)),
    );

    assert_eq!(outcome.grade.exit_code(), EXIT_TOPOLOGY_MISMATCH);
    match &outcome.grade {
        Grade::TopologyMismatch { diagnostics } => {
            assert_eq!(
                diagnostics,
                &vec!["(h211-eth0) should have address 10.2.1.2/24; observed 10.2.1.1/24".to_string()]
            );
        }
        other => panic!("unexpected grade {other:?}"),
    }
    assert_eq!(outcome.results.len(), 1);
    // Convergence sampling and `ip -j addr show` only: no check ran.
    assert_eq!(net.count_calls("vtysh"), 0);
    assert!(net.calls().len() > before);
}

#[test]
fn test_one_broken_policy_fails_only_route_section() {
    let net = reference_network().on(
        "r120",
        "ip route",
        "10.4.1.0/25 nhid 40 via 192.168.1.3 dev r120-eth2 proto bgp metric 20\n\
         10.4.1.128/25 nhid 41 via 192.168.1.3 dev r120-eth2 proto bgp metric 20\n",
    );
    let outcome = grade_network(
        &net,
        &assignment_two_topology(),
        &Fixtures::assignment_two(),
        &fast_config(),
        &RunGuard::new(Duration::from_secs(60)),
    );
    assert_eq!(
        outcome.grade,
        Grade::Failed {
            failed: vec!["Route".into()]
        }
    );
    let route = outcome.results.iter().find(|r| r.name == "Route").unwrap();
    assert_eq!(route.diagnostics.len(), 1);
    assert!(route.diagnostics[0].contains("route to 10.4.1.0/25 passes through r110"));
}

#[test]
fn test_cancelled_run_is_aborted() {
    let net = reference_network();
    let guard = RunGuard::new(Duration::from_secs(60));
    guard.cancel();
    let outcome = grade_network(
        &net,
        &assignment_two_topology(),
        &Fixtures::assignment_two(),
        &fast_config(),
        &guard,
    );
    assert_eq!(
        outcome.grade,
        Grade::Aborted {
            reason: "interrupted".into()
        }
    );
    assert_eq!(outcome.grade.exit_code(), EXIT_ABORTED);
    assert!(net.calls().is_empty());
}
