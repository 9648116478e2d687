/*!

The per-region result cache.

Each region is simulated exactly once, when its population row first arrives, using the
session-wide `ModelPolicy`. Rows may arrive in any order and the set of regions is never known
upfront. Asking for a region that has not been cached is not an error: it reads as `None`,
which renderers treat as "no data".

Once the input barrier fires the cache is sealed: playback only reads it, and late rows are
rejected with `IxaError::CacheSealed`. The only way to recompute sealed results is an explicit
`reparameterize` while playback is idle.

*/

use crate::context::{Context, DataPlugin};
use crate::error::IxaError;
use crate::model::{simulate, ModelPolicy, SimulationResult};
use crate::timeline::{ContextTimelineExt, PlaybackState};
use crate::HashMap;
use log::{debug, info, trace};

/// One geographic region and its forecast.
#[derive(Clone, Debug)]
pub struct Region {
    code: String,
    population: u64,
    result: SimulationResult,
}

impl Region {
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn population(&self) -> u64 {
        self.population
    }

    #[must_use]
    pub fn result(&self) -> &SimulationResult {
        &self.result
    }
}

pub(crate) struct RegionData {
    policy: ModelPolicy,
    regions: HashMap<String, Region>,
    sealed: bool,
}

impl DataPlugin for RegionData {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &|| {
        trace!("initializing region cache");
        RegionData {
            policy: ModelPolicy::default(),
            regions: HashMap::default(),
            sealed: false,
        }
    };
}

impl RegionData {
    pub(crate) fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    fn insert(&mut self, code: &str, population: u64) -> Result<(), IxaError> {
        let result = simulate(&self.policy.request(population)).map_err(|error| match error {
            IxaError::InvalidConfiguration(message) => {
                IxaError::InvalidConfiguration(format!("region {code}: {message}"))
            }
            other => other,
        })?;

        debug!(
            "cached region {code} (population {population}, peak infected {})",
            result.infected().iter().max().copied().unwrap_or(0)
        );
        // Re-inserting a known code overwrites it. With the policy unchanged the result is
        // identical, so repeated rows are harmless.
        self.regions.insert(
            code.to_string(),
            Region {
                code: code.to_string(),
                population,
                result,
            },
        );
        Ok(())
    }
}

/// Receives `(region code, population)` rows from a tabular loader.
pub trait RowConsumer {
    fn on_row(&mut self, code: &str, population: u64) -> Result<(), IxaError>;
}

impl RowConsumer for Context {
    fn on_row(&mut self, code: &str, population: u64) -> Result<(), IxaError> {
        self.put_region(code, population)
    }
}

pub trait ContextRegionExt {
    /// Simulates `code` with the current policy and caches the result, replacing any earlier
    /// result for the same code.
    fn put_region(&mut self, code: &str, population: u64) -> Result<(), IxaError>;

    /// The cached forecast for `code`, or `None` if the region is unknown.
    fn get_region_result(&self, code: &str) -> Option<&SimulationResult>;

    fn get_region(&self, code: &str) -> Option<&Region>;

    fn region_count(&self) -> usize;

    /// All cached region codes, sorted.
    fn region_codes(&self) -> Vec<String>;

    fn model_policy(&self) -> ModelPolicy;

    /// Replaces the policy and recomputes every cached region with it. Only allowed while
    /// playback is idle. On error nothing is changed.
    fn reparameterize(&mut self, policy: ModelPolicy) -> Result<(), IxaError>;

    /// Rejects every later `put_region`.
    fn seal_regions(&mut self);

    fn regions_sealed(&self) -> bool;
}

impl ContextRegionExt for Context {
    fn put_region(&mut self, code: &str, population: u64) -> Result<(), IxaError> {
        let region_data = self.get_data_container_mut::<RegionData>();
        if region_data.sealed {
            return Err(IxaError::CacheSealed(code.to_string()));
        }
        region_data.insert(code, population)
    }

    fn get_region_result(&self, code: &str) -> Option<&SimulationResult> {
        self.get_region(code).map(Region::result)
    }

    fn get_region(&self, code: &str) -> Option<&Region> {
        self.get_data_container::<RegionData>()
            .and_then(|region_data| region_data.regions.get(code))
    }

    fn region_count(&self) -> usize {
        self.get_data_container::<RegionData>()
            .map_or(0, |region_data| region_data.regions.len())
    }

    fn region_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .get_data_container::<RegionData>()
            .map(|region_data| region_data.regions.keys().cloned().collect())
            .unwrap_or_default();
        codes.sort_unstable();
        codes
    }

    fn model_policy(&self) -> ModelPolicy {
        self.get_data_container::<RegionData>()
            .map_or_else(ModelPolicy::default, |region_data| region_data.policy)
    }

    fn reparameterize(&mut self, policy: ModelPolicy) -> Result<(), IxaError> {
        let state = self.playback_state();
        if state != PlaybackState::Idle {
            return Err(IxaError::InvalidPlaybackTransition {
                from: state.name(),
                action: "reparameterize",
            });
        }
        policy.validate()?;

        let region_data = self.get_data_container_mut::<RegionData>();
        let mut recomputed = RegionData {
            policy,
            regions: HashMap::default(),
            sealed: region_data.sealed,
        };
        for region in region_data.regions.values() {
            recomputed.insert(&region.code, region.population)?;
        }
        info!(
            "reparameterized {} regions: beta {}, gamma {}, horizon {}, step {}",
            recomputed.regions.len(),
            policy.beta,
            policy.gamma,
            policy.horizon,
            policy.step
        );
        *region_data = recomputed;
        Ok(())
    }

    fn seal_regions(&mut self) {
        let region_data = self.get_data_container_mut::<RegionData>();
        region_data.sealed = true;
        info!("region cache sealed with {} regions", region_data.regions.len());
    }

    fn regions_sealed(&self) -> bool {
        self.get_data_container::<RegionData>()
            .is_some_and(|region_data| region_data.sealed)
    }
}
