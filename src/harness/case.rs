//! Service test cases.

use std::future::Future;
use std::time::Duration;

use tracing::info;

use super::driver::Driver;
use super::scenario::{
    expected_good_iterations, LogCheck, TestCaseId, TestConfig, WdmOption,
    GOOD_ITERATION_PATTERN,
};
use crate::error::Result;

/// An end-to-end WDM service test.
pub trait WdmServiceTest {
    /// Identifier of the test: the implementing type's own name, without
    /// module path or generic arguments.
    fn tag(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Configuration handed to the driver
    fn config(&self) -> Result<TestConfig>;

    /// Build the configuration and run it once.
    fn run(&self) -> impl Future<Output = Result<()>> + Send;
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// O01: the client creates a mutual subscription, sends an update request
/// to the publisher and receives a status report.
#[derive(Debug)]
pub struct ServiceUpdate01Cond<D> {
    driver: D,
}

impl<D: Driver> ServiceUpdate01Cond<D> {
    pub const ITERATIONS: u32 = 2;
    pub const TOTAL_CLIENTS: u32 = 11;

    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

impl<D: Driver> WdmServiceTest for ServiceUpdate01Cond<D> {
    fn config(&self) -> Result<TestConfig> {
        TestConfig::builder()
            .wdm_option(WdmOption::MutualSubscribe)
            .final_client_status(0)
            .enable_client_flip(true)
            .test_client_iterations(Self::ITERATIONS)
            .test_client_delay(Duration::from_millis(15000))
            .client_clear_state_between_iterations(false)
            .test_client_case(TestCaseId::UpdatableOneTraitConditional)
            .total_client_count(Self::TOTAL_CLIENTS)
            .client_log_check([LogCheck::new(
                GOOD_ITERATION_PATTERN,
                expected_good_iterations(Self::ITERATIONS, Self::TOTAL_CLIENTS),
            )])
            .test_tag(self.tag())
            .test_case_name([
                "Wdm-NestService-O01: Client creates mutual subscription, send update request to publisher, and receive status report",
            ])
            .build()
    }

    async fn run(&self) -> Result<()> {
        let config = self.config()?;
        info!("test file: {}", config.test_tag);
        info!("weave-wdm-next test O01");
        self.driver.run(&config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unit;

    impl Driver for Unit {
        async fn run(&self, _config: &TestConfig) -> Result<()> {
            Ok(())
        }
    }

    #[test_log::test]
    fn short_names_drop_path_and_generics() {
        assert_eq!(short_type_name("a::b::Case"), "Case");
        assert_eq!(short_type_name("a::Case<x::Driver<y::Z>>"), "Case");
        assert_eq!(short_type_name("Case"), "Case");
    }

    #[test_log::test]
    fn tag_is_the_type_name() {
        assert_eq!(ServiceUpdate01Cond::new(Unit).tag(), "ServiceUpdate01Cond");
    }
}
