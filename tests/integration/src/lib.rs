//! End-to-end tests: a real router instance over the loopback interface,
//! talking to wiremock vendors.

pub mod helpers;
pub mod mock_providers;

#[cfg(test)]
mod api_tests;
#[cfg(test)]
mod cancel_tests;
#[cfg(test)]
mod queue_tests;
#[cfg(test)]
mod routing_tests;
#[cfg(test)]
mod streaming_tests;
