/*!

The `Context` owns every piece of mutable state in a session: data plugins (region cache,
timeline, load barrier, ...) keyed by type, and a queue of plans ordered by playback time.
Components never reach for ambient state; they get at their data through the `Context` they are
handed.

Playback time is measured in milliseconds. When real-time pacing is enabled, `execute()` sleeps
until each plan's time has elapsed on the wall clock; otherwise plans run back to back, which is
what tests want.

*/

use crate::{type_of, HashMap, TypeId};
use log::trace;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// A data container that knows how to construct its own empty state. The `Context` creates each
/// plugin lazily the first time it is asked for.
pub trait DataPlugin: Any {
    /// A constant reference to a constructor
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self;
}

impl<T: 'static> DataPlugin for Vec<T> {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &Vec::<T>::new;
}

/// Handle returned by `Context::add_plan`, used to cancel the plan before it fires.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PlanId(u64);

type Callback = Box<dyn FnOnce(&mut Context)>;

// Ordered so that `BinaryHeap` (a max-heap) pops the earliest plan first, breaking ties by
// insertion order.
#[derive(Debug)]
struct PlanEntry {
    time: f64,
    id: u64,
}

impl PartialEq for PlanEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PlanEntry {}

impl PartialOrd for PlanEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PlanEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

pub struct Context {
    // This is actually a `HashMap<TypeId, Box<dyn DataPlugin>>` but must be declared this way to
    // avoid having to implement an `as_any()` method on everything.
    data_plugins: HashMap<TypeId, Box<dyn Any>>,
    plan_queue: BinaryHeap<PlanEntry>,
    // A plan whose callback is missing here has been cancelled.
    plan_callbacks: HashMap<u64, Callback>,
    next_plan_id: u64,
    current_time: f64,
    shutdown_requested: bool,
    real_time: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Context {
            data_plugins: HashMap::default(),
            plan_queue: BinaryHeap::new(),
            plan_callbacks: HashMap::default(),
            next_plan_id: 0,
            current_time: 0.0,
            shutdown_requested: false,
            real_time: false,
        }
    }

    /// Returns a mutable reference for the data container for `T`, creating it if it doesn't
    /// exist yet.
    pub fn get_data_container_mut<T: DataPlugin>(&mut self) -> &mut T {
        self.data_plugins
            .entry(type_of::<T>())
            .or_insert_with(|| Box::new(<T as DataPlugin>::new()))
            .downcast_mut::<T>()
            .unwrap() // Will never panic as data container has the matching type
    }

    /// Returns a reference to the data container for `T` if it exists.
    /// If you need a mutable reference or lazy instantiation, use
    /// `Context::get_data_container_mut()`.
    #[must_use]
    pub fn get_data_container<T: DataPlugin>(&self) -> Option<&T> {
        self.data_plugins
            .get(&type_of::<T>())
            .and_then(|data| data.downcast_ref::<T>())
    }

    /// Schedules `callback` to run at playback time `time` (milliseconds).
    ///
    /// # Panics
    /// If `time` is earlier than the current time or is not finite.
    pub fn add_plan(&mut self, time: f64, callback: impl FnOnce(&mut Context) + 'static) -> PlanId {
        assert!(
            time.is_finite() && time >= self.current_time,
            "Time is invalid: {time} (current time {})",
            self.current_time
        );
        let id = self.next_plan_id;
        self.next_plan_id += 1;
        self.plan_queue.push(PlanEntry { time, id });
        self.plan_callbacks.insert(id, Box::new(callback));
        trace!("added plan {id} at time {time}");
        PlanId(id)
    }

    /// Cancels a plan. A cancelled plan never runs. Returns `false` if the plan already ran or
    /// was cancelled before.
    pub fn cancel_plan(&mut self, plan_id: &PlanId) -> bool {
        let cancelled = self.plan_callbacks.remove(&plan_id.0).is_some();
        if cancelled {
            trace!("cancelled plan {}", plan_id.0);
        }
        cancelled
    }

    /// Number of plans that are still waiting to run.
    #[must_use]
    pub fn pending_plan_count(&self) -> usize {
        self.plan_callbacks.len()
    }

    #[must_use]
    pub fn get_current_time(&self) -> f64 {
        self.current_time
    }

    /// Pace plans against the wall clock: a plan at time `t` runs `t` milliseconds after
    /// `execute()` was entered.
    pub fn set_real_time(&mut self, real_time: bool) {
        self.real_time = real_time;
    }

    /// Stops `execute()` after the currently running plan returns.
    pub fn shutdown(&mut self) {
        trace!("shutdown requested");
        self.shutdown_requested = true;
    }

    /// Runs plans in time order until the queue is empty or `shutdown()` is called.
    pub fn execute(&mut self) {
        let start = Instant::now();
        let start_time = self.current_time;

        while !self.shutdown_requested {
            let Some(entry) = self.plan_queue.pop() else {
                break;
            };
            let Some(callback) = self.plan_callbacks.remove(&entry.id) else {
                continue;
            };

            if self.real_time {
                let due = Duration::from_secs_f64((entry.time - start_time).max(0.0) / 1000.0);
                if let Some(remaining) = due.checked_sub(start.elapsed()) {
                    std::thread::sleep(remaining);
                }
            }

            self.current_time = entry.time;
            callback(self);
        }

        self.shutdown_requested = false;
    }
}
