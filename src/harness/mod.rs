//! # End-to-End Service Tests
//!
//! Configuration contract for the WDM end-to-end service scenarios. A test
//! case assembles a [`TestConfig`] and hands it, once, to an injected
//! [`Driver`]; the driver runs the mock devices against the service and
//! fails the test when the collected logs do not match.
//!
//! ```text
//! ┌─────────────────────┐  TestConfig   ┌──────────────┐
//! │ ServiceUpdate01Cond │ ────────────▶ │    Driver    │ ── mock devices ⇄ service
//! └─────────────────────┘    run()      └──────────────┘
//!                                              │
//!                                   check_log_counts(observed)
//! ```
//!
//! The log counts are derived, never hard-coded: see
//! [`expected_good_iterations`].
//!
//! ```no_run
//! use wdm_next::harness::{ServiceUpdate01Cond, WdmServiceTest, Driver, TestConfig};
//!
//! struct Lab;
//!
//! impl Driver for Lab {
//!     async fn run(&self, config: &TestConfig) -> wdm_next::Result<()> {
//!         println!("{:?}", config.device_args());
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> wdm_next::Result<()> {
//! ServiceUpdate01Cond::new(Lab).run().await?;
//! # Ok(())
//! # }
//! ```

pub mod case;
pub mod driver;
pub mod scenario;

pub use case::{ServiceUpdate01Cond, WdmServiceTest};
pub use driver::{check_log_counts, Driver};
pub use scenario::{
    expected_good_iterations, ArgValue, LogCheck, TestCaseId, TestConfig, TestConfigBuilder,
    WdmOption, GOOD_ITERATION_PATTERN, MUTATED_PROPERTIES, UPDATE_LOGS_PER_ITERATION_PER_PEER,
};
