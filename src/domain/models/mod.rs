pub mod config;
pub mod dut;
pub mod parameter;
pub mod ruleset;
pub mod service;
pub mod umpire_config;

pub use config::{LoggingConfig, ServerConfig, SupervisionConfig};
pub use dut::{DutIdentity, DUT_INFO_KEYS};
pub use parameter::{Component, Directory, ParameterDocument};
pub use ruleset::{EnableUpdate, MatchCondition, Rule, RuleMatch, StageRange};
pub use service::{ProcessState, ServiceProcessConfig};
pub use umpire_config::{Bundle, RulesetDiff, ServiceSection, UmpireConfig};
