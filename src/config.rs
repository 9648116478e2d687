/*!

Session configuration, read from a JSON file. Every field is optional:

```json
{
  "model": { "beta": 0.2, "gamma": 0.1, "horizon": 100.0, "step": 1.0 },
  "playback": { "tick_interval_ms": 1000, "real_time": true },
  "color_scale": { "max_expected_infected": 10000.0 },
  "inputs": { "population": "population.csv", "mobility": "AirTravel.csv" },
  "report": "frames.csv",
  "log_level": "info"
}
```

Relative input and report paths are resolved against the directory holding the config file.

*/

use crate::error::IxaError;
use crate::log::parse_log_level;
use crate::model::ModelPolicy;
use crate::quantize::{QuantizeScale, DEFAULT_MAX_EXPECTED_INFECTED, PURPLES};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlaybackOptions {
    pub tick_interval_ms: u64,
    /// Pace ticks against the wall clock instead of running them back to back.
    pub real_time: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        PlaybackOptions {
            tick_interval_ms: 1000,
            real_time: false,
        }
    }
}

impl PlaybackOptions {
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorScaleOptions {
    pub max_expected_infected: f64,
    pub palette: Vec<String>,
}

impl Default for ColorScaleOptions {
    fn default() -> Self {
        ColorScaleOptions {
            max_expected_infected: DEFAULT_MAX_EXPECTED_INFECTED,
            palette: PURPLES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ColorScaleOptions {
    pub fn scale(&self) -> Result<QuantizeScale, IxaError> {
        QuantizeScale::new(self.max_expected_infected, self.palette.clone())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputPaths {
    pub population: Option<PathBuf>,
    /// Loaded and kept for queries; not used by the model.
    pub mobility: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    pub model: ModelPolicy,
    pub playback: PlaybackOptions,
    pub color_scale: ColorScaleOptions,
    pub inputs: InputPaths,
    pub report: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl ForecastConfig {
    /// Reads and validates a config file, resolving relative paths against its directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, IxaError> {
        let path = path.as_ref();
        let mut config: ForecastConfig = serde_json::from_reader(BufReader::new(File::open(path)?))?;

        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, IxaError> {
        let config: ForecastConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IxaError> {
        self.model.validate()?;
        self.color_scale.scale()?;
        self.log_level()?;
        if self.playback.tick_interval_ms == 0 {
            return Err(IxaError::invalid_configuration("tick_interval_ms must be at least 1"));
        }
        Ok(())
    }

    pub fn log_level(&self) -> Result<Option<LevelFilter>, IxaError> {
        self.log_level.as_deref().map(parse_log_level).transpose()
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut Option<PathBuf>| {
            if let Some(path) = path.as_mut().filter(|path| path.is_relative()) {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.inputs.population);
        resolve(&mut self.inputs.mobility);
        resolve(&mut self.report);
    }
}
