//! Resize tracking.
//!
//! Stands in for a resize observer: on every animation frame the tracker looks at the
//! containers it observes, and for those whose content height changed it reports the new height
//! to the [`DimensionReporter`] and schedules a debounced `output-resized` notification.
//!
//! Outputs whose content appears or disappears (content height crossing the epsilon) get their
//! padding toggled. That change is deferred to the next frame, and the height is reported
//! only once the padding is in place.

use crate::dimension::{DimensionOptions, DimensionReporter};
use crate::dom::{Container, Edges};
use crate::events::{EventBus, RuntimeEvent};
use crate::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Layout constants the tracker applies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeSettings {
    /// Padding applied to outputs that have content.
    pub padding: Edges,
    pub content_epsilon: f32,
    pub debounce: Duration,
}

impl ResizeSettings {
    pub fn from_config(cfg: &crate::config::RuntimeConfig) -> Self {
        let pad = cfg.output_node_padding;
        Self {
            padding: Edges::new(pad, pad, pad, cfg.output_node_left_padding),
            content_epsilon: cfg.content_epsilon,
            debounce: cfg.resize_debounce(),
        }
    }

    /// Heights at or below the epsilon are borders and empty wrappers, not content.
    #[inline]
    pub fn has_content(&self, height: f32) -> bool {
        height > self.content_epsilon
    }
}

impl Default for ResizeSettings {
    fn default() -> Self {
        Self::from_config(&crate::config::RuntimeConfig::default())
    }
}

struct Observed {
    cell_id: String,
    container: Container,
    is_output: bool,
    last_generation: Option<u64>,
    last_content_height: Option<f32>,
    last_known_height: f32,
    padded: bool,
}

struct Debounce {
    seq: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct TrackerState {
    observed: HashMap<String, Observed>,
    /// Padding flips found in the previous frame: `(id, has_content)`.
    flips: Vec<(String, bool)>,
    timers: HashMap<String, Debounce>,
    next_seq: u64,
}

#[derive(Clone)]
pub struct ResizeTracker {
    state: Arc<Mutex<TrackerState>>,
    reporter: DimensionReporter,
    bus: EventBus,
    settings: ResizeSettings,
}

impl std::fmt::Debug for ResizeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResizeTracker")
            .field("observed", &lock(&self.state).observed.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ResizeTracker {
    pub fn new(reporter: DimensionReporter, bus: EventBus, settings: ResizeSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState::default())),
            reporter,
            bus,
            settings,
        }
    }

    /// Start observing `container` under `id`.
    ///
    /// `reported_height` is the height the caller has just reported itself, if any, so the
    /// first frame does not report it again.
    pub fn observe(&self, id: &str, cell_id: &str, container: Container, is_output: bool, reported_height: Option<f32>) {
        let padded = !container.read(|t| t.padding(t.root())).is_zero();
        let observed = Observed {
            cell_id: cell_id.to_string(),
            container,
            is_output,
            last_generation: None,
            last_content_height: None,
            last_known_height: reported_height.unwrap_or(-1.0),
            padded,
        };
        lock(&self.state).observed.insert(id.to_string(), observed);
    }

    pub fn settings(&self) -> ResizeSettings {
        self.settings
    }

    pub fn unobserve(&self, id: &str) {
        let mut state = lock(&self.state);
        state.observed.remove(id);
        state.flips.retain(|(f, _)| f != id);
    }

    pub fn is_observed(&self, id: &str) -> bool {
        lock(&self.state).observed.contains_key(id)
    }

    /// One animation frame: apply last frame's padding flips, then scan for size changes.
    pub fn on_frame(&self) {
        let flips = std::mem::take(&mut lock(&self.state).flips);
        for (id, has_content) in flips {
            self.apply_flip(&id, has_content);
        }

        let ids: Vec<String> = lock(&self.state).observed.keys().cloned().collect();
        for id in ids {
            self.check(&id, false);
        }
    }

    /// Measure `id` now and report without waiting for a frame. Padding flips apply immediately.
    pub fn measure_now(&self, id: &str) {
        self.check(id, true);
    }

    fn check(&self, id: &str, immediate: bool) {
        let mut state = lock(&self.state);
        let Some(obs) = state.observed.get_mut(id) else { return };

        let generation = obs.container.generation();
        if obs.last_generation == Some(generation) && !immediate {
            return;
        }
        obs.last_generation = Some(generation);

        let content_height = obs.container.content_height();
        let resized = obs.last_content_height != Some(content_height);
        obs.last_content_height = Some(content_height);
        if !resized && !immediate {
            return;
        }
        let cell_id = obs.cell_id.clone();

        if !obs.is_output {
            let height = obs.container.offset_height();
            let report = take_if_changed(obs, height);
            drop(state);
            if let Some(h) = report {
                self.reporter.update_height(id, h, DimensionOptions::markup());
            }
            self.post_resized(&cell_id);
            return;
        }

        let has_content = self.settings.has_content(content_height);
        if has_content != obs.padded {
            if immediate {
                drop(state);
                self.apply_flip(id, has_content);
            } else if !state.flips.iter().any(|(f, _)| f == id) {
                state.flips.push((id.to_string(), has_content));
                drop(state);
            }
            self.post_resized(&cell_id);
            return;
        }

        let height = if has_content { obs.container.offset_height() } else { 0.0 };
        let report = take_if_changed(obs, height);
        drop(state);
        if let Some(h) = report {
            self.reporter.update_height(id, h, DimensionOptions::output(false));
        }
        self.post_resized(&cell_id);
    }

    fn apply_flip(&self, id: &str, has_content: bool) {
        let report = {
            let mut state = lock(&self.state);
            let Some(obs) = state.observed.get_mut(id) else { return };

            let root = obs.container.root();
            let padding = if has_content { self.settings.padding } else { Edges::ZERO };
            obs.container.set_padding(root, padding);
            obs.padded = has_content;
            // padding does not change the content box
            obs.last_generation = Some(obs.container.generation());

            let height = if has_content { obs.container.offset_height() } else { 0.0 };
            take_if_changed(obs, height)
        };
        if let Some(h) = report {
            self.reporter.update_height(id, h, DimensionOptions::output(false));
        }
    }

    /// Debounced `output-resized` for `cell_id`.
    fn post_resized(&self, cell_id: &str) {
        let cancel = CancellationToken::new();
        let seq = {
            let mut state = lock(&self.state);
            state.next_seq += 1;
            let seq = state.next_seq;
            if let Some(previous) = state.timers.insert(
                cell_id.to_string(),
                Debounce {
                    seq,
                    cancel: cancel.clone(),
                },
            ) {
                previous.cancel.cancel();
            }
            seq
        };

        let tracker = self.clone();
        let cell_id = cell_id.to_string();
        let delay = self.settings.debounce;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            {
                let mut state = lock(&tracker.state);
                if state.timers.get(&cell_id).map(|d| d.seq) != Some(seq) {
                    return;
                }
                state.timers.remove(&cell_id);
            }
            tracker.bus.publish(RuntimeEvent::OutputResized { cell_id });
        });
    }
}

fn take_if_changed(obs: &mut Observed, height: f32) -> Option<f32> {
    if obs.last_known_height == height {
        return None;
    }
    obs.last_known_height = height;
    Some(height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::DimensionUpdate;
    use tokio::sync::broadcast::Receiver;

    fn setup() -> (ResizeTracker, DimensionReporter, Receiver<RuntimeEvent>) {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        let reporter = DimensionReporter::new(bus.clone());
        let settings = ResizeSettings {
            padding: Edges::new(8.0, 8.0, 8.0, 4.0),
            content_epsilon: 2.1,
            debounce: Duration::from_millis(250),
        };
        (ResizeTracker::new(reporter.clone(), bus, settings), reporter, rx)
    }

    fn drain(rx: &mut Receiver<RuntimeEvent>) -> Vec<RuntimeEvent> {
        let mut out = vec![];
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn dimensions(events: &[RuntimeEvent]) -> Vec<DimensionUpdate> {
        events
            .iter()
            .filter_map(|e| match e {
                RuntimeEvent::Dimension { updates } => Some(updates.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn content_appearing_pads_on_next_frame_then_reports() {
        let (tracker, reporter, mut rx) = setup();
        let c = Container::new("div", 10.0);
        tracker.observe("o1", "c1", c.clone(), true, Some(0.0));

        let root = c.root();
        c.append_text(root, "hello");
        tracker.on_frame();
        reporter.flush_now();
        assert!(dimensions(&drain(&mut rx)).is_empty());
        assert!(c.read(|t| t.padding(root)).is_zero());

        tracker.on_frame();
        reporter.flush_now();
        assert_eq!(c.read(|t| t.padding(root)), Edges::new(8.0, 8.0, 8.0, 4.0));
        let updates = dimensions(&drain(&mut rx));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].height, 26.0);
        assert!(updates[0].is_output);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_epsilon_content_counts_as_empty() {
        let (tracker, reporter, mut rx) = setup();
        let c = Container::new("div", 10.0);
        let root = c.root();
        c.set_padding(root, Edges::new(8.0, 8.0, 8.0, 4.0));
        tracker.observe("o1", "c1", c.clone(), true, Some(26.0));

        let thin = c.append_element(root, "div");
        c.write(|t| t.set_height(thin, Some(2.0)));
        tracker.on_frame();
        tracker.on_frame();
        reporter.flush_now();

        assert!(c.read(|t| t.padding(root)).is_zero());
        assert_eq!(dimensions(&drain(&mut rx))[0].height, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_height_is_not_reported_twice() {
        let (tracker, reporter, mut rx) = setup();
        let c = Container::new("div", 10.0);
        let root = c.root();
        c.append_text(root, "x");
        tracker.observe("m1", "m1", c.clone(), false, None);

        tracker.on_frame();
        reporter.flush_now();
        assert_eq!(dimensions(&drain(&mut rx))[0].height, 10.0);

        c.add_class(root, "selected");
        tracker.on_frame();
        tracker.measure_now("m1");
        reporter.flush_now();
        assert!(dimensions(&drain(&mut rx)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn output_resized_is_debounced_per_cell() {
        let (tracker, _reporter, mut rx) = setup();
        let c = Container::new("div", 10.0);
        let root = c.root();
        c.set_padding(root, Edges::new(8.0, 8.0, 8.0, 4.0));
        tracker.observe("o1", "c1", c.clone(), true, None);

        c.append_text(root, "a");
        tracker.on_frame();
        tokio::time::sleep(Duration::from_millis(100)).await;
        c.append_text(root, "\nb");
        tracker.on_frame();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!drain(&mut rx).iter().any(|e| matches!(e, RuntimeEvent::OutputResized { .. })));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let resized: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, RuntimeEvent::OutputResized { .. }))
            .collect();
        assert_eq!(resized, vec![RuntimeEvent::OutputResized { cell_id: "c1".into() }]);
    }

    #[tokio::test(start_paused = true)]
    async fn measure_now_applies_flip_immediately() {
        let (tracker, reporter, mut rx) = setup();
        let c = Container::new("div", 10.0);
        tracker.observe("o1", "c1", c.clone(), true, Some(0.0));
        let root = c.root();
        c.append_text(root, "x");

        tracker.measure_now("o1");
        reporter.flush_now();
        assert_eq!(dimensions(&drain(&mut rx))[0].height, 26.0);
    }
}
