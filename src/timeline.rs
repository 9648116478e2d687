/*!

The playback timeline.

```text
            start               tick past last index
   Idle ───────────▶ Running ───────────────────────▶ Finished
    ▲                 │   ▲
    │          pause  ▼   │ resume
    │                Paused
    └──────── restart (from any state)
```

The timeline holds a single discrete index, `current_tick`, bounded by the session policy's
`horizon / step`. Scheduling and semantics are kept apart: `advance_tick()` is a pure step over
the cache that anyone can call, and `start_playback()` merely arranges for it to be called every
tick interval through the `Context` plan queue. Pausing or restarting cancels the pending plan,
so a stale tick can never fire against a reset index.

Every new index is published to frame subscribers, which is how a renderer hears about it.

*/

use crate::barrier::ContextLoadExt;
use crate::context::{Context, DataPlugin, PlanId};
use crate::error::IxaError;
use crate::region::{ContextRegionExt, RegionData};
use crate::HashMap;
use log::{debug, info, trace};
use std::rc::Rc;
use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PlaybackState {
    Idle,
    Running,
    Paused,
    Finished,
}

impl PlaybackState {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PlaybackState::Idle => "Idle",
            PlaybackState::Running => "Running",
            PlaybackState::Paused => "Paused",
            PlaybackState::Finished => "Finished",
        }
    }
}

/// The infected count of every cached region at one tick. Looking up a region without data
/// gives `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    tick: usize,
    values: HashMap<String, u64>,
}

impl Frame {
    #[must_use]
    pub fn tick(&self) -> usize {
        self.tick
    }

    #[must_use]
    pub fn get(&self, code: &str) -> Option<u64> {
        self.values.get(code).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(code, infected)` pairs sorted by code.
    #[must_use]
    pub fn sorted(&self) -> Vec<(&str, u64)> {
        let mut values: Vec<(&str, u64)> = self
            .values
            .iter()
            .map(|(code, infected)| (code.as_str(), *infected))
            .collect();
        values.sort_unstable_by(|a, b| a.0.cmp(b.0));
        values
    }

    /// Values for an externally supplied list of codes, such as the shapes a renderer drew.
    pub fn lookup<'a>(&self, codes: impl IntoIterator<Item = &'a str>) -> Vec<(&'a str, Option<u64>)> {
        codes.into_iter().map(|code| (code, self.get(code))).collect()
    }
}

type FrameCallback = Rc<dyn Fn(&mut Context, &Frame)>;

struct TimelineData {
    state: PlaybackState,
    current_tick: usize,
    tick_interval: Duration,
    pending_tick: Option<PlanId>,
    subscribers: Vec<FrameCallback>,
}

impl DataPlugin for TimelineData {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self = &|| {
        trace!("initializing timeline");
        TimelineData {
            state: PlaybackState::Idle,
            current_tick: 0,
            tick_interval: DEFAULT_TICK_INTERVAL,
            pending_tick: None,
            subscribers: Vec::new(),
        }
    };
}

pub trait ContextTimelineExt {
    fn playback_state(&self) -> PlaybackState;

    fn current_tick(&self) -> usize;

    /// The bound on `current_tick`, derived from the session policy.
    fn last_tick(&self) -> usize;

    fn set_tick_interval(&mut self, interval: Duration);

    fn tick_interval(&self) -> Duration;

    /// `Idle → Running`. Fails unless every expected input has finished loading. Publishes the
    /// frame for tick 0 and schedules the repeating tick.
    fn start_playback(&mut self) -> Result<(), IxaError>;

    /// `Running → Paused`, keeping the current tick.
    fn pause_playback(&mut self) -> Result<(), IxaError>;

    /// `Paused → Running`, continuing from the current tick.
    fn resume_playback(&mut self) -> Result<(), IxaError>;

    /// Back to `Idle` at tick 0 from any state.
    fn restart_playback(&mut self);

    /// Performs one tick if playback is running. Ticking past the last index clamps to it and
    /// finishes playback.
    ///
    /// Returns the state after frame subscribers have run, so a subscriber that pauses or
    /// restarts playback is reflected in the result.
    fn advance_tick(&mut self) -> PlaybackState;

    /// The infected count for every cached region at the current tick.
    fn frame(&self) -> Frame;

    /// Registers a callback that receives every published frame.
    fn subscribe_to_frames(&mut self, callback: impl Fn(&mut Context, &Frame) + 'static);
}

trait ContextTimelineExtInternal {
    fn schedule_next_tick(&mut self);
    fn cancel_pending_tick(&mut self);
    fn publish_frame(&mut self);
    fn transition(&mut self, action: &'static str, from: PlaybackState, to: PlaybackState) -> Result<(), IxaError>;
}

impl ContextTimelineExtInternal for Context {
    fn schedule_next_tick(&mut self) {
        let interval = self.tick_interval().as_secs_f64() * 1000.0;
        let time = self.get_current_time() + interval;
        let plan = self.add_plan(time, |context| {
            context.get_data_container_mut::<TimelineData>().pending_tick = None;
            // A subscriber may have paused, restarted or re-armed playback during this tick.
            if context.advance_tick() == PlaybackState::Running
                && context
                    .get_data_container::<TimelineData>()
                    .is_some_and(|timeline| timeline.pending_tick.is_none())
            {
                context.schedule_next_tick();
            }
        });
        self.get_data_container_mut::<TimelineData>().pending_tick = Some(plan);
    }

    fn cancel_pending_tick(&mut self) {
        if let Some(plan) = self.get_data_container_mut::<TimelineData>().pending_tick.take() {
            self.cancel_plan(&plan);
        }
    }

    fn publish_frame(&mut self) {
        let subscribers = self.get_data_container_mut::<TimelineData>().subscribers.clone();
        if subscribers.is_empty() {
            return;
        }
        let frame = self.frame();
        for callback in subscribers {
            callback(self, &frame);
        }
    }

    fn transition(&mut self, action: &'static str, from: PlaybackState, to: PlaybackState) -> Result<(), IxaError> {
        let timeline = self.get_data_container_mut::<TimelineData>();
        if timeline.state != from {
            return Err(IxaError::InvalidPlaybackTransition {
                from: timeline.state.name(),
                action,
            });
        }
        timeline.state = to;
        info!("playback {action}: {} -> {} at tick {}", from.name(), to.name(), timeline.current_tick);
        Ok(())
    }
}

impl ContextTimelineExt for Context {
    fn playback_state(&self) -> PlaybackState {
        self.get_data_container::<TimelineData>()
            .map_or(PlaybackState::Idle, |timeline| timeline.state)
    }

    fn current_tick(&self) -> usize {
        self.get_data_container::<TimelineData>()
            .map_or(0, |timeline| timeline.current_tick)
    }

    fn last_tick(&self) -> usize {
        // The stored policy is validated on every write, so this cannot fail.
        self.model_policy().last_tick().unwrap_or(0)
    }

    fn set_tick_interval(&mut self, interval: Duration) {
        self.get_data_container_mut::<TimelineData>().tick_interval = interval;
    }

    fn tick_interval(&self) -> Duration {
        self.get_data_container::<TimelineData>()
            .map_or(DEFAULT_TICK_INTERVAL, |timeline| timeline.tick_interval)
    }

    fn start_playback(&mut self) -> Result<(), IxaError> {
        if !self.inputs_loaded() {
            return Err(IxaError::InputsNotLoaded);
        }
        self.transition("start", PlaybackState::Idle, PlaybackState::Running)?;
        // Armed before publishing so a subscriber's pause or restart can cancel it.
        self.schedule_next_tick();
        self.publish_frame();
        Ok(())
    }

    fn pause_playback(&mut self) -> Result<(), IxaError> {
        self.transition("pause", PlaybackState::Running, PlaybackState::Paused)?;
        self.cancel_pending_tick();
        Ok(())
    }

    fn resume_playback(&mut self) -> Result<(), IxaError> {
        self.transition("resume", PlaybackState::Paused, PlaybackState::Running)?;
        self.schedule_next_tick();
        Ok(())
    }

    fn restart_playback(&mut self) {
        self.cancel_pending_tick();
        let timeline = self.get_data_container_mut::<TimelineData>();
        info!("playback restart from {} at tick {}", timeline.state.name(), timeline.current_tick);
        timeline.state = PlaybackState::Idle;
        timeline.current_tick = 0;
    }

    fn advance_tick(&mut self) -> PlaybackState {
        let last_tick = self.last_tick();
        let timeline = self.get_data_container_mut::<TimelineData>();
        if timeline.state != PlaybackState::Running {
            debug!("ignoring tick while {}", timeline.state.name());
            return timeline.state;
        }

        if timeline.current_tick >= last_tick {
            timeline.current_tick = last_tick;
            timeline.state = PlaybackState::Finished;
            info!("playback finished at tick {last_tick}");
            self.cancel_pending_tick();
            return PlaybackState::Finished;
        }

        timeline.current_tick += 1;
        debug!("tick {}", timeline.current_tick);
        self.publish_frame();
        self.playback_state()
    }

    fn frame(&self) -> Frame {
        let tick = self.current_tick();
        let values = self
            .get_data_container::<RegionData>()
            .map(|region_data| {
                region_data
                    .regions()
                    .filter_map(|region| {
                        region
                            .result()
                            .infected_at(tick)
                            .map(|infected| (region.code().to_string(), infected))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Frame { tick, values }
    }

    fn subscribe_to_frames(&mut self, callback: impl Fn(&mut Context, &Frame) + 'static) {
        self.get_data_container_mut::<TimelineData>()
            .subscribers
            .push(Rc::new(callback));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelPolicy;
    use std::cell::RefCell;

    const INPUT: &str = "population";

    fn loaded_context(regions: &[(&str, u64)], policy: ModelPolicy) -> Context {
        let mut context = Context::new();
        context.reparameterize(policy).unwrap();
        context.expect_input(INPUT).unwrap();
        for (code, population) in regions {
            context.put_region(code, *population).unwrap();
        }
        context.complete_input(INPUT).unwrap();
        context
    }

    fn short_policy() -> ModelPolicy {
        ModelPolicy { horizon: 100.0, step: 10.0, ..ModelPolicy::default() }
    }

    #[test]
    fn frame_before_any_put_has_no_data() {
        let context = Context::new();
        let frame = context.frame();
        assert!(frame.is_empty());
        assert_eq!(frame.tick(), 0);
        assert_eq!(frame.get("USA"), None);
        assert_eq!(frame.lookup(["USA", "BRA"]), vec![("USA", None), ("BRA", None)]);
    }

    #[test]
    fn frame_reads_infected_at_current_tick() {
        let mut context = loaded_context(&[("IND", 1000), ("CHN", 2000)], short_policy());
        context.start_playback().unwrap();
        context.advance_tick();
        context.advance_tick();

        let frame = context.frame();
        assert_eq!(frame.tick(), 2);
        assert_eq!(frame.get("IND"), Some(7));
        assert_eq!(
            frame.get("CHN"),
            context.get_region_result("CHN").unwrap().infected_at(2)
        );
        assert_eq!(frame.get("ATA"), None);
        assert_eq!(frame.sorted().iter().map(|(code, _)| *code).collect::<Vec<_>>(), vec!["CHN", "IND"]);
    }

    #[test]
    fn start_requires_loaded_inputs() {
        let mut context = Context::new();
        context.expect_input(INPUT).unwrap();
        context.put_region("MEX", 1000).unwrap();

        assert!(matches!(context.start_playback(), Err(IxaError::InputsNotLoaded)));
        assert_eq!(context.playback_state(), PlaybackState::Idle);

        context.complete_input(INPUT).unwrap();
        context.start_playback().unwrap();
        assert_eq!(context.playback_state(), PlaybackState::Running);
    }

    #[test]
    fn ticking_clamps_at_the_bound() {
        let mut context = loaded_context(&[("EGY", 1000)], short_policy());
        context.start_playback().unwrap();

        for expected in 1..=10 {
            assert_eq!(context.advance_tick(), PlaybackState::Running);
            assert_eq!(context.current_tick(), expected);
        }
        assert_eq!(context.advance_tick(), PlaybackState::Finished);
        assert_eq!(context.current_tick(), 10);

        // No further increments once finished.
        assert_eq!(context.advance_tick(), PlaybackState::Finished);
        assert_eq!(context.current_tick(), 10);
        assert_eq!(context.frame().get("EGY"), Some(54));
    }

    #[test]
    fn scheduled_playback_runs_to_completion() {
        let mut context = loaded_context(&[("ZAF", 1000)], short_policy());
        context.set_tick_interval(Duration::from_millis(250));
        context.start_playback().unwrap();
        context.execute();

        assert_eq!(context.playback_state(), PlaybackState::Finished);
        assert_eq!(context.current_tick(), 10);
        // Ten increments plus the tick that detects the end.
        assert_eq!(context.get_current_time(), 11.0 * 250.0);
        assert_eq!(context.pending_plan_count(), 0);
    }

    #[test]
    fn pause_keeps_tick_and_cancels_schedule() {
        let mut context = loaded_context(&[("DEU", 1000)], short_policy());
        context.start_playback().unwrap();
        context.add_plan(2500.0, |context| context.pause_playback().unwrap());
        context.execute();

        assert_eq!(context.playback_state(), PlaybackState::Paused);
        assert_eq!(context.current_tick(), 2);
        assert_eq!(context.pending_plan_count(), 0);

        context.resume_playback().unwrap();
        context.execute();
        assert_eq!(context.playback_state(), PlaybackState::Finished);
        assert_eq!(context.current_tick(), 10);
    }

    #[test]
    fn restart_cancels_stale_ticks() {
        let mut context = loaded_context(&[("CAN", 1000)], short_policy());
        context.start_playback().unwrap();
        context.add_plan(3500.0, ContextTimelineExt::restart_playback);
        context.execute();

        assert_eq!(context.playback_state(), PlaybackState::Idle);
        assert_eq!(context.current_tick(), 0);
        assert_eq!(context.pending_plan_count(), 0);
        assert_eq!(context.get_current_time(), 3500.0);
    }

    #[test]
    fn restart_is_valid_from_every_state() {
        let mut context = loaded_context(&[("FIN", 1000)], short_policy());
        context.restart_playback();
        assert_eq!(context.playback_state(), PlaybackState::Idle);

        context.start_playback().unwrap();
        context.advance_tick();
        context.pause_playback().unwrap();
        context.restart_playback();
        assert_eq!((context.playback_state(), context.current_tick()), (PlaybackState::Idle, 0));

        context.start_playback().unwrap();
        context.execute();
        assert_eq!(context.playback_state(), PlaybackState::Finished);
        context.restart_playback();
        assert_eq!((context.playback_state(), context.current_tick()), (PlaybackState::Idle, 0));
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut context = loaded_context(&[("SWE", 1000)], short_policy());
        assert!(matches!(
            context.pause_playback(),
            Err(IxaError::InvalidPlaybackTransition { from: "Idle", action: "pause" })
        ));
        assert!(context.resume_playback().is_err());

        context.start_playback().unwrap();
        assert!(context.start_playback().is_err());
        assert!(context.resume_playback().is_err());
        assert!(context.reparameterize(ModelPolicy::default()).is_err());
    }

    #[test]
    fn ticks_are_ignored_unless_running() {
        let mut context = loaded_context(&[("ESP", 1000)], short_policy());
        assert_eq!(context.advance_tick(), PlaybackState::Idle);
        assert_eq!(context.current_tick(), 0);
    }

    #[test]
    fn subscribers_receive_every_frame() {
        let mut context = loaded_context(&[("POL", 1000)], short_policy());
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        context.subscribe_to_frames(move |_, frame| {
            sink.borrow_mut().push((frame.tick(), frame.get("POL")));
        });

        context.start_playback().unwrap();
        context.execute();

        let received = received.borrow();
        assert_eq!(received.len(), 11);
        assert_eq!(received[0], (0, Some(1)));
        assert_eq!(received[7], (7, Some(153)));
        assert_eq!(received[10], (10, Some(54)));
    }

    fn recorded_frames(context: &mut Context) -> Rc<RefCell<Vec<(f64, usize)>>> {
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        context.subscribe_to_frames(move |context, frame| {
            sink.borrow_mut().push((context.get_current_time(), frame.tick()));
        });
        received
    }

    #[test]
    fn pause_from_a_subscriber_leaves_one_tick_chain() {
        let mut context = loaded_context(&[("ITA", 1000)], short_policy());
        context.subscribe_to_frames(|context, frame| {
            if frame.tick() == 3 {
                context.pause_playback().unwrap();
            }
        });
        let received = recorded_frames(&mut context);

        context.start_playback().unwrap();
        context.execute();
        assert_eq!(context.playback_state(), PlaybackState::Paused);
        assert_eq!(context.current_tick(), 3);
        assert_eq!(context.pending_plan_count(), 0);

        context.add_plan(3500.0, |context| context.resume_playback().unwrap());
        context.execute();

        assert_eq!(context.playback_state(), PlaybackState::Finished);
        let received = received.borrow();
        assert_eq!(&received[3..6], &[(3000.0, 3), (4500.0, 4), (5500.0, 5)]);
        assert_eq!(received.last(), Some(&(10500.0, 10)));
        assert_eq!(received.len(), 11);
    }

    #[test]
    fn restart_from_a_subscriber_drops_the_stale_tick() {
        let mut context = loaded_context(&[("NOR", 1000)], short_policy());
        let restarted = Rc::new(RefCell::new(false));
        let flag = restarted.clone();
        context.subscribe_to_frames(move |context, frame| {
            if frame.tick() == 3 && !*flag.borrow() {
                *flag.borrow_mut() = true;
                context.restart_playback();
                context.start_playback().unwrap();
            }
        });
        let received = recorded_frames(&mut context);

        context.start_playback().unwrap();
        context.execute();

        assert_eq!(context.playback_state(), PlaybackState::Finished);
        assert_eq!(context.pending_plan_count(), 0);
        let received = received.borrow();
        // The tick-3 frame already in flight still reaches later subscribers, after the restarted
        // run's tick-0 frame. Then one tick per interval.
        assert_eq!(
            &received[3..7],
            &[(3000.0, 0), (3000.0, 3), (4000.0, 1), (5000.0, 2)]
        );
        assert_eq!(received.last(), Some(&(13000.0, 10)));
        assert_eq!(received.len(), 15);
    }

    #[test]
    fn pause_from_a_subscriber_at_start_cancels_the_first_tick() {
        let mut context = loaded_context(&[("PRT", 1000)], short_policy());
        context.subscribe_to_frames(|context, frame| {
            if frame.tick() == 0 && context.playback_state() == PlaybackState::Running {
                context.pause_playback().unwrap();
            }
        });

        context.start_playback().unwrap();
        assert_eq!(context.playback_state(), PlaybackState::Paused);
        assert_eq!(context.pending_plan_count(), 0);
    }
}
