#[cfg(test)]
pub mod predicate_tests;

#[cfg(test)]
pub mod check_tests;

#[cfg(test)]
pub mod topology_check_tests;



#[cfg(test)]
pub mod harness_tests;
