/*!

Logging for the crate goes through the `log` facade. This module owns the `log4rs` backend: a
single console appender whose level can be changed at any time.

```rust,no_run
use ixa_forecast::log::{set_log_level, LevelFilter};

set_log_level(LevelFilter::Debug).expect("failed to configure logging");
```

*/

pub use log::{debug, error, info, trace, warn, LevelFilter};

use crate::error::IxaError;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Handle;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

const APPENDER_NAME: &str = "stdout";
const LOG_PATTERN: &str = "{d(%H:%M:%S%.3f)} {h({l:<5})} {t} - {m}{n}";
/// The level used by `enable_logging()`.
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

// `log4rs` can only be installed as the global logger once; afterwards its config is swapped
// through the handle.
static LOG_HANDLE: Mutex<Option<Handle>> = Mutex::new(None);

fn build_config(level: LevelFilter) -> Result<Config, IxaError> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    Config::builder()
        .appender(Appender::builder().build(APPENDER_NAME, Box::new(stdout)))
        .build(Root::builder().appender(APPENDER_NAME).build(level))
        .map_err(|errors| IxaError::IxaError(format!("invalid logging configuration: {errors}")))
}

/// Sets the maximum level that is printed, installing the logger on first use.
pub fn set_log_level(level: LevelFilter) -> Result<(), IxaError> {
    let config = build_config(level)?;
    let mut handle = LOG_HANDLE.lock().unwrap_or_else(PoisonError::into_inner);

    match handle.as_ref() {
        Some(handle) => handle.set_config(config),
        None => *handle = Some(log4rs::init_config(config)?),
    }
    Ok(())
}

pub fn enable_logging() -> Result<(), IxaError> {
    set_log_level(DEFAULT_LOG_LEVEL)
}

pub fn disable_logging() -> Result<(), IxaError> {
    set_log_level(LevelFilter::Off)
}

/// Parses a level name such as `"debug"` or `"warn"` (case-insensitive).
pub fn parse_log_level(name: &str) -> Result<LevelFilter, IxaError> {
    LevelFilter::from_str(name)
        .map_err(|_| IxaError::invalid_configuration(format!("unknown log level {name:?}")))
}
