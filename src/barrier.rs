/*!

A join point for asynchronous inputs. Each loader registers the input it is responsible for with
`expect_input` and reports `complete_input` when its last row has been handed over. When the
final expected input completes, the barrier fires exactly once: the region cache is sealed and
every `on_inputs_loaded` continuation is queued to run at the current time.

Playback refuses to start until the barrier has fired, so every row that arrived is in the cache
before the first frame is computed.

*/

use crate::context::{Context, DataPlugin};
use crate::error::IxaError;
use crate::region::ContextRegionExt;
use crate::HashSet;
use log::{info, trace};

type Continuation = Box<dyn FnOnce(&mut Context)>;

struct LoadBarrierData {
    pending: HashSet<String>,
    completed: HashSet<String>,
    fired: bool,
    continuations: Vec<Continuation>,
}

impl DataPlugin for LoadBarrierData {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &|| {
        trace!("initializing load barrier");
        LoadBarrierData {
            pending: HashSet::default(),
            completed: HashSet::default(),
            fired: false,
            continuations: Vec::new(),
        }
    };
}

pub trait ContextLoadExt {
    /// Registers an input the barrier must wait for.
    ///
    /// Fails once the barrier has fired.
    fn expect_input(&mut self, name: &str) -> Result<(), IxaError>;

    /// Marks an input as loaded. Completing the last pending input fires the barrier.
    ///
    /// Fails if `name` was never expected.
    fn complete_input(&mut self, name: &str) -> Result<(), IxaError>;

    /// Whether the barrier has fired.
    fn inputs_loaded(&self) -> bool;

    /// Inputs that are still outstanding, sorted.
    fn pending_inputs(&self) -> Vec<String>;

    /// Runs `callback` once every expected input has loaded. If the barrier has already fired,
    /// the callback is queued right away.
    fn on_inputs_loaded(&mut self, callback: impl FnOnce(&mut Context) + 'static);
}

impl ContextLoadExt for Context {
    fn expect_input(&mut self, name: &str) -> Result<(), IxaError> {
        let barrier = self.get_data_container_mut::<LoadBarrierData>();
        if barrier.fired {
            return Err(IxaError::IxaError(format!(
                "input {name} registered after all inputs loaded"
            )));
        }
        if !barrier.completed.contains(name) {
            trace!("expecting input {name}");
            barrier.pending.insert(name.to_string());
        }
        Ok(())
    }

    fn complete_input(&mut self, name: &str) -> Result<(), IxaError> {
        let barrier = self.get_data_container_mut::<LoadBarrierData>();
        if !barrier.pending.remove(name) {
            if barrier.completed.contains(name) {
                return Ok(());
            }
            return Err(IxaError::IxaError(format!("input {name} was never expected")));
        }
        barrier.completed.insert(name.to_string());
        info!("input {name} loaded");

        if !barrier.pending.is_empty() {
            return Ok(());
        }

        barrier.fired = true;
        let continuations = std::mem::take(&mut barrier.continuations);
        info!("all inputs loaded");
        self.seal_regions();

        let now = self.get_current_time();
        for continuation in continuations {
            self.add_plan(now, continuation);
        }
        Ok(())
    }

    fn inputs_loaded(&self) -> bool {
        self.get_data_container::<LoadBarrierData>()
            .is_some_and(|barrier| barrier.fired)
    }

    fn pending_inputs(&self) -> Vec<String> {
        let mut pending: Vec<String> = self
            .get_data_container::<LoadBarrierData>()
            .map(|barrier| barrier.pending.iter().cloned().collect())
            .unwrap_or_default();
        pending.sort_unstable();
        pending
    }

    fn on_inputs_loaded(&mut self, callback: impl FnOnce(&mut Context) + 'static) {
        if self.inputs_loaded() {
            let now = self.get_current_time();
            self.add_plan(now, callback);
        } else {
            self.get_data_container_mut::<LoadBarrierData>()
                .continuations
                .push(Box::new(callback));
        }
    }
}
