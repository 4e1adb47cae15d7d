#[cfg(test)]
pub mod compose_flow_tests;
#[cfg(test)]
pub mod handshake_flow_tests;
#[cfg(test)]
pub mod utils;
