/*!

Wires a whole session together from a `ForecastConfig`: logging, model policy, playback options,
the frame report, input loading behind the load barrier, and playback started as the barrier's
continuation.

*/

use crate::barrier::ContextLoadExt;
use crate::config::ForecastConfig;
use crate::context::Context;
use crate::error::IxaError;
use crate::loader::{load_mobility_file, load_population_file};
use crate::log::set_log_level;
use crate::region::ContextRegionExt;
use crate::report::ContextFrameReportExt;
use crate::timeline::ContextTimelineExt;
use log::{error, info};
use std::path::Path;

pub const POPULATION_INPUT: &str = "population";
pub const MOBILITY_INPUT: &str = "mobility";

/// Builds a context from `config` and loads its inputs. Playback is queued to start as soon as
/// the inputs are in; call `Context::execute()` to run it.
pub fn initialize(config: &ForecastConfig) -> Result<Context, IxaError> {
    if let Some(level) = config.log_level()? {
        set_log_level(level)?;
    }

    let mut context = Context::new();
    context.reparameterize(config.model)?;
    context.set_tick_interval(config.playback.tick_interval());
    context.set_real_time(config.playback.real_time);
    if let Some(report) = &config.report {
        context.add_frame_report(report, config.color_scale.scale()?)?;
    }

    let population = config.inputs.population.as_ref().ok_or_else(|| {
        IxaError::invalid_configuration("no population input configured")
    })?;
    context.expect_input(POPULATION_INPUT)?;
    if config.inputs.mobility.is_some() {
        context.expect_input(MOBILITY_INPUT)?;
    }

    context.on_inputs_loaded(|context| {
        info!("starting playback of {} regions", context.region_count());
        if let Err(e) = context.start_playback() {
            error!("failed to start playback: {e}");
        }
    });

    load_population_file(population, &mut context)?;
    context.complete_input(POPULATION_INPUT)?;
    if let Some(mobility) = &config.inputs.mobility {
        load_mobility_file(&mut context, mobility)?;
        context.complete_input(MOBILITY_INPUT)?;
    }

    Ok(context)
}

/// Loads the config at `path` and plays the forecast to the end.
pub fn run_with_config(path: impl AsRef<Path>) -> Result<Context, IxaError> {
    let config = ForecastConfig::from_file(path)?;
    let mut context = initialize(&config)?;
    context.execute();
    info!(
        "playback {} at tick {} of {}",
        context.playback_state().name(),
        context.current_tick(),
        context.last_tick()
    );
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputPaths;
    use crate::model::ModelPolicy;
    use crate::timeline::PlaybackState;

    #[test]
    fn population_input_is_required() {
        let result = initialize(&ForecastConfig::default());
        assert!(matches!(result, Err(IxaError::InvalidConfiguration(_))));
    }

    #[test]
    fn playback_waits_for_every_input() {
        let dir = tempfile::tempdir().unwrap();
        let population = dir.path().join("population.csv");
        std::fs::write(&population, "code,pop\nGHA,1000\n").unwrap();

        let config = ForecastConfig {
            model: ModelPolicy { step: 10.0, ..ModelPolicy::default() },
            inputs: InputPaths { population: Some(population), mobility: None },
            ..ForecastConfig::default()
        };
        let mut context = initialize(&config).unwrap();

        assert!(context.inputs_loaded());
        assert!(context.regions_sealed());
        // Playback starts from the barrier continuation, inside `execute()`.
        assert_eq!(context.playback_state(), PlaybackState::Idle);

        context.execute();
        assert_eq!(context.playback_state(), PlaybackState::Finished);
        assert_eq!(context.current_tick(), 10);
        assert_eq!(context.frame().get("GHA"), Some(54));
    }
}
