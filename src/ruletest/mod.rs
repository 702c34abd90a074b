// src/ruletest/mod.rs

//! Ad-hoc rule tests: each test writes the rule to a scratch file, runs the
//! engine's `test-rule` subcommand against it and collects or streams the
//! output.

pub mod events;
pub mod options;
pub mod runner;
pub mod temp_rule;

pub use events::{join_output, ExitReport, StreamEvent};
pub use options::TestOptions;
pub use runner::{Subscriber, TestOutcome, TestRunner, TEST_RULE_SUBCOMMAND};
pub use temp_rule::TempRuleFile;
