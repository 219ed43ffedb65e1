//! Test support: scripted substrates, static launchers, canned probes.
//!
//! These doubles are used by the crate's own tests and are exported for
//! downstream crates testing pipelines without real tools or services.

mod fixtures;

pub use fixtures::{
    failing_stage, finding_stage, init_test_logging, passing_stage, test_config, InstantProbe,
    NeverReadyProbe, ScriptedSubstrate, StaticLauncher,
};
