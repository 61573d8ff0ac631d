//! Import-specification driven ETL: template parsing, row shaping, match
//! rules and graph materialization.

pub mod catalog;
pub mod match_rules;
pub mod rows;
pub mod runner;
pub mod spec;
pub mod xlsx;
pub mod xml;

pub use match_rules::MatchRuleSet;
pub use rows::load_rows;
pub use runner::run_template;
pub use spec::ImportTemplate;
