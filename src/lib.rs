/*!

Per-region epidemic forecasts with a tick-driven playback timeline.

Population rows are turned into one SIR forecast per region (integrated with a fixed-step RK4
solver) and cached in a `Context`. Once every input has loaded, the playback timeline advances
one time index per tick and publishes, for each index, the infected count of every region to
whatever renders the map.

```rust
use ixa_forecast::{Context, ContextLoadExt, ContextRegionExt, ContextTimelineExt, ModelPolicy};

let mut context = Context::new();
context.reparameterize(ModelPolicy { step: 10.0, ..ModelPolicy::default() }).unwrap();
context.expect_input("population").unwrap();
context.put_region("FRA", 67_000_000).unwrap();
context.complete_input("population").unwrap();

context.start_playback().unwrap();
context.execute();
assert_eq!(context.current_tick(), 10);
assert!(context.frame().get("FRA").is_some());
assert!(context.frame().get("ATA").is_none());
```

*/

pub mod barrier;
pub mod config;
pub mod context;
pub mod error;
pub mod integrator;
pub mod loader;
pub mod log;
pub mod mobility;
pub mod model;
pub mod quantize;
pub mod region;
pub mod report;
pub mod runner;
pub mod timeline;

// All modules import `crate::TypeId` in case we want to change the underlying type of `TypeId`.
pub(crate) use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
pub(crate) use std::any::TypeId;

pub use barrier::ContextLoadExt;
pub use config::ForecastConfig;
pub use context::{Context, DataPlugin, PlanId};
pub use error::IxaError;
pub use integrator::{integrate, Steps};
pub use mobility::{ContextMobilityExt, MobilityRecord};
pub use model::{simulate, ModelPolicy, SimulationRequest, SimulationResult};
pub use quantize::QuantizeScale;
pub use region::{ContextRegionExt, Region, RowConsumer};
pub use report::ContextFrameReportExt;
pub use timeline::{ContextTimelineExt, Frame, PlaybackState};

// Replace with `typeid::of as type_of` if necessary.
#[inline(always)]
#[must_use]
pub fn type_of<T: 'static>() -> TypeId {
    TypeId::of::<T>()
}
