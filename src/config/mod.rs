//! Configuration management for portwatch.
//!
//! Settings come from a TOML file located through XDG paths, with
//! secrets optionally overridden from the environment.

mod settings;

pub use settings::{
    parse_duration, DatabaseSettings, MasscanSettings, Paths, SchedulerSettings, Settings,
    SmtpSecurity, SmtpSettings, StrategyKind, TelegramSettings, CONFIG_ENV_VAR,
};
