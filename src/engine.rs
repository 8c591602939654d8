//! Shared result store and arming protocol.
//!
//! `Engine` owns the single latest `DetectionEvent`, the arm token and the
//! gating state machine behind one mutex, so `arm()` (read token, overwrite
//! result, set armed flag, reset scene state) is a single critical section as
//! seen by the capture loop.
//!
//! Readers never see raw state. `peek()` applies the suppression rule: while
//! armed, anything that is not present or whose `seq` is not newer than the
//! arm token is reported as absent.
//!
//! `wait_for_next()` suspends on a condition variable that the capture loop
//! signals on every publish, and re-checks at least once per poll interval, so
//! timeouts and cancellation are observed within one poll interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::classify::RawPrediction;
use crate::frame::Frame;
use crate::gate::{DetectionEvent, GateThresholds, GateVerdict, GatingStateMachine};
use crate::record::SortRecord;

/// Default upper bound a caller waits for the next detection.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(12);
/// Default interval between re-checks while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Result of waiting for the next detection.
#[derive(Clone, Debug, PartialEq)]
pub enum WaitOutcome {
    Detected(DetectionEvent),
    Timeout,
    Cancelled,
}

impl WaitOutcome {
    pub fn into_event(self) -> Option<DetectionEvent> {
        match self {
            WaitOutcome::Detected(event) => Some(event),
            WaitOutcome::Timeout | WaitOutcome::Cancelled => None,
        }
    }
}

/// Lets a waiting caller give up early. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct EngineState {
    result: DetectionEvent,
    latest_accepted: Option<DetectionEvent>,
    arm_token: u64,
    gate: GatingStateMachine,
}

impl EngineState {
    fn store(&mut self, event: DetectionEvent) {
        if event.present {
            let newer = self
                .latest_accepted
                .as_ref()
                .map_or(true, |prev| event.seq > prev.seq);
            if newer {
                self.latest_accepted = Some(event.clone());
            }
        }
        self.result = event;
    }

    fn visible(&self) -> DetectionEvent {
        let res = &self.result;
        if self.gate.is_armed() && (!res.present || res.seq <= self.arm_token) {
            return DetectionEvent::absent(res.seq, res.confidence);
        }
        res.clone()
    }

    /// Newest acceptance a waiter may take. While armed, the current arm
    /// token hides older acceptances exactly as `visible()` does, whatever
    /// token the waiter holds.
    fn qualifying(&self, arm_token: u64, last_saved_seq: Option<u64>) -> Option<DetectionEvent> {
        self.latest_accepted
            .as_ref()
            .filter(|ev| {
                ev.seq > arm_token
                    && (!self.gate.is_armed() || ev.seq > self.arm_token)
                    && last_saved_seq.map_or(true, |saved| ev.seq > saved)
            })
            .cloned()
    }
}

pub struct Engine {
    state: Mutex<EngineState>,
    published: Condvar,
    poll_interval: Duration,
}

impl Engine {
    pub fn new(thresholds: GateThresholds) -> Self {
        Self {
            state: Mutex::new(EngineState {
                result: DetectionEvent::absent(0, 0.0),
                latest_accepted: None,
                arm_token: 0,
                gate: GatingStateMachine::new(thresholds),
            }),
            published: Condvar::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            log::error!("engine state lock poisoned; continuing with inner state");
            poisoned.into_inner()
        })
    }

    /// Run one gating pass and publish its result. Capture loop only.
    pub fn process(&self, pred: RawPrediction, frame: &Frame) -> DetectionEvent {
        let event = {
            let mut state = self.lock();
            let event = state.gate.evaluate(pred, frame);
            state.store(event.clone());
            event
        };
        self.published.notify_all();
        event
    }

    /// Replace the shared result.
    pub fn publish(&self, event: DetectionEvent) {
        self.lock().store(event);
        self.published.notify_all();
    }

    /// Snapshot of the shared result, with stale values suppressed while armed.
    pub fn peek(&self) -> DetectionEvent {
        self.lock().visible()
    }

    /// Start a new sorting attempt. Returns the arm token (the `seq` current at
    /// the moment of arming); only detections with a larger `seq` count.
    pub fn arm(&self) -> u64 {
        let mut state = self.lock();
        let token = state.result.seq;
        state.result = DetectionEvent::absent(token, 0.0);
        state.arm_token = token;
        state.gate.arm();
        log::info!("armed for next detection (token={})", token);
        token
    }

    pub fn is_armed(&self) -> bool {
        self.lock().gate.is_armed()
    }

    pub fn arm_token(&self) -> u64 {
        self.lock().arm_token
    }

    pub fn last_verdict(&self) -> GateVerdict {
        self.lock().gate.last_verdict()
    }

    pub fn set_target_crop(&self, name: &str) {
        self.lock().gate.set_target_crop(name);
    }

    pub fn target_crop(&self) -> String {
        self.lock().gate.target_crop().to_string()
    }

    /// Peek, normalised into a sort record. `None` unless a fresh detection is
    /// visible.
    pub fn current_record(&self) -> Option<SortRecord> {
        let (event, target_crop) = {
            let state = self.lock();
            (state.visible(), state.gate.target_crop().to_string())
        };
        SortRecord::from_event(&event, &target_crop)
    }

    /// Block until a detection newer than both `arm_token` and
    /// `last_saved_seq` is accepted, or until `timeout` elapses.
    ///
    /// A timeout too large to represent as a deadline means no deadline: the
    /// wait then ends only on a detection or cancellation.
    pub fn wait_for_next(
        &self,
        arm_token: u64,
        last_saved_seq: Option<u64>,
        timeout: Duration,
    ) -> WaitOutcome {
        self.wait_for_next_cancellable(arm_token, last_saved_seq, timeout, &CancelToken::new())
    }

    pub fn wait_for_next_cancellable(
        &self,
        arm_token: u64,
        last_saved_seq: Option<u64>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> WaitOutcome {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock();
        loop {
            if let Some(event) = state.qualifying(arm_token, last_saved_seq) {
                return WaitOutcome::Detected(event);
            }
            if cancel.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::Timeout;
                    }
                    self.poll_interval.min(deadline - now)
                }
                None => self.poll_interval,
            };
            state = self
                .published
                .wait_timeout(state, pause)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(GateThresholds::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Engine")
            .field("seq", &state.result.seq)
            .field("armed", &state.gate.is_armed())
            .field("arm_token", &state.arm_token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(seq: u64) -> DetectionEvent {
        DetectionEvent {
            present: true,
            seq,
            crop_type: "Tomato".to_string(),
            condition: "Not Damaged".to_string(),
            color: "Red".to_string(),
            sorted_to: "Right Bin".to_string(),
            size: "Medium".to_string(),
            time_detected: "2026-10-19 08:00:00".to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn starts_absent_at_seq_zero() {
        let engine = Engine::default();
        let ev = engine.peek();
        assert!(!ev.present);
        assert_eq!(ev.seq, 0);
        assert!(!engine.is_armed());
    }

    #[test]
    fn peek_passes_through_when_unarmed() {
        let engine = Engine::default();
        engine.publish(detection(3));
        assert_eq!(engine.peek(), detection(3));
    }

    #[test]
    fn arm_returns_current_seq_and_clears_result() {
        let engine = Engine::default();
        engine.publish(detection(4));
        let token = engine.arm();
        assert_eq!(token, 4);
        assert_eq!(engine.arm_token(), 4);
        assert!(engine.is_armed());
        let ev = engine.peek();
        assert!(!ev.present);
        assert_eq!(ev.seq, 4);
    }

    #[test]
    fn armed_peek_hides_stale_publishes() {
        let engine = Engine::default();
        engine.publish(detection(4));
        let token = engine.arm();
        engine.publish(detection(token));
        assert!(!engine.peek().present);
        engine.publish(detection(token + 1));
        assert!(engine.peek().present);
    }

    #[test]
    fn wait_returns_immediately_when_already_satisfied() {
        let engine = Engine::default();
        engine.publish(detection(2));
        let outcome = engine.wait_for_next(1, None, Duration::from_secs(5));
        assert_eq!(outcome, WaitOutcome::Detected(detection(2)));
    }

    #[test]
    fn wait_survives_result_being_overwritten() {
        let engine = Engine::default();
        engine.publish(detection(5));
        engine.publish(DetectionEvent::absent(5, 0.1));
        let outcome = engine.wait_for_next(4, Some(4), Duration::from_millis(10));
        assert_eq!(outcome.into_event().map(|e| e.seq), Some(5));
    }

    #[test]
    fn wait_honours_cancellation() {
        let engine = Engine::default().with_poll_interval(Duration::from_millis(5));
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome =
            engine.wait_for_next_cancellable(0, None, Duration::from_secs(10), &cancel);
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[test]
    fn unbounded_timeout_waits_until_cancelled() {
        let engine = Arc::new(Engine::default().with_poll_interval(Duration::from_millis(5)));
        let cancel = CancelToken::new();
        let waiter = {
            let engine = Arc::clone(&engine);
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                engine.wait_for_next_cancellable(0, None, Duration::MAX, &cancel)
            })
        };
        std::thread::sleep(Duration::from_millis(30));
        cancel.cancel();
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Cancelled);

        engine.publish(detection(1));
        let outcome = engine.wait_for_next(0, None, Duration::MAX);
        assert_eq!(outcome.into_event().map(|e| e.seq), Some(1));
    }

    #[test]
    fn armed_wait_ignores_acceptances_at_or_below_the_current_token() {
        let engine = Engine::default();
        engine.publish(detection(3));
        engine.publish(detection(4));
        let token = engine.arm();
        assert_eq!(token, 4);
        let outcome = engine.wait_for_next(3, None, Duration::from_millis(20));
        assert_eq!(outcome, WaitOutcome::Timeout);
    }

    #[test]
    fn target_crop_is_normalised() {
        let engine = Engine::default();
        engine.set_target_crop("  Bell Pepper ");
        assert_eq!(engine.target_crop(), "bell pepper");
    }
}
