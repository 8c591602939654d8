use std::sync::Arc;
use std::time::{Duration, Instant};

use sort_kernel::classify::ClassLabel;
use sort_kernel::{
    DetectionEvent, Engine, Frame, GateThresholds, GateVerdict, RawPrediction, WaitOutcome,
};

const W: u32 = 32;
const H: u32 = 32;

fn flat() -> Frame {
    Frame::solid(W, H, [85, 85, 85]).unwrap()
}

/// Textured red patch on the belt; `shift` slides it sideways.
fn produce(shift: u32) -> Frame {
    let mut pixels = Vec::with_capacity((W * H * 3) as usize);
    for y in 0..H {
        for x in 0..W {
            let inside = x >= 4 + shift && x < 20 + shift && (6..26).contains(&y);
            if inside {
                let v = if (x + y) % 2 == 0 { 230 } else { 120 };
                pixels.extend_from_slice(&[v, 20, 20]);
            } else {
                pixels.extend_from_slice(&[85, 85, 85]);
            }
        }
    }
    Frame::from_rgb(pixels, W, H).unwrap()
}

fn tomato(conf: f32) -> RawPrediction {
    ClassLabel::parse("tomato_not_damaged_red").into_prediction(conf, 0.2)
}

fn pepper(conf: f32) -> RawPrediction {
    ClassLabel::parse("bellpepper_not_damaged_green").into_prediction(conf, 0.2)
}

fn stored(seq: u64) -> DetectionEvent {
    DetectionEvent {
        present: true,
        seq,
        crop_type: "Tomato".to_string(),
        condition: "Not Damaged".to_string(),
        color: "Red".to_string(),
        sorted_to: "Right Bin".to_string(),
        size: "Medium".to_string(),
        time_detected: "2026-10-19 10:00:00".to_string(),
        confidence: 0.9,
    }
}

/// Arm, show an empty belt (baseline + motion prime), then a tomato.
fn sort_one(engine: &Engine) -> DetectionEvent {
    let token = engine.arm();
    assert!(!engine.process(tomato(0.9), &flat()).present);
    let event = engine.process(tomato(0.9), &produce(0));
    assert!(event.present, "verdict was {:?}", engine.last_verdict());
    assert!(event.seq > token);
    event
}

#[test]
fn accepted_seqs_are_strictly_increasing() {
    let engine = Engine::default();
    let mut seqs = Vec::new();
    for round in 0..5 {
        seqs.push(sort_one(&engine).seq);
        // Armed flag consumed: the sticky motion keeps later ticks eligible.
        for shift in 1..=round {
            let ev = engine.process(tomato(0.9), &produce(shift));
            if ev.present {
                seqs.push(ev.seq);
            }
        }
    }
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "seqs: {:?}", seqs);
    assert_eq!(seqs.first(), Some(&1));
}

#[test]
fn arming_hides_stale_events() {
    let engine = Engine::default();
    engine.publish(stored(5));
    let token = engine.arm();
    assert_eq!(token, 5);

    // A stale value written right after arming is still reported absent.
    engine.publish(stored(5));
    let ev = engine.peek();
    assert!(!ev.present);
    assert_eq!(ev.seq, 5);

    engine.publish(stored(3));
    assert!(!engine.peek().present);
    assert!(engine.current_record().is_none());

    engine.publish(stored(6));
    assert_eq!(engine.peek(), stored(6));
    assert_eq!(engine.current_record().map(|r| r.seq), Some(6));
}

#[test]
fn rearming_hides_earlier_detections_from_older_waiters() {
    let engine = Engine::default().with_poll_interval(Duration::from_millis(10));
    engine.publish(stored(3));
    engine.publish(stored(4));

    // A second request re-arms while the first still holds token 3.
    let token = engine.arm();
    assert_eq!(token, 4);
    assert!(!engine.peek().present);

    let outcome = engine.wait_for_next(3, None, Duration::from_millis(50));
    assert_eq!(outcome, WaitOutcome::Timeout);

    engine.publish(stored(5));
    let outcome = engine.wait_for_next(3, None, Duration::from_millis(50));
    assert_eq!(outcome.into_event().map(|e| e.seq), Some(5));
}

#[test]
fn debounce_needs_the_full_streak() {
    let engine = Engine::new(GateThresholds {
        min_present_streak: 3,
        ..GateThresholds::default()
    });
    engine.arm();
    engine.process(tomato(0.9), &flat());
    assert!(!engine.process(tomato(0.9), &produce(0)).present);
    assert!(!engine.process(tomato(0.9), &produce(1)).present);
    assert_eq!(engine.last_verdict(), GateVerdict::Debouncing);
    let ev = engine.process(tomato(0.9), &produce(2));
    assert!(ev.present);
    assert_eq!(ev.seq, 1);
}

#[test]
fn alternating_classes_never_accept() {
    let engine = Engine::new(GateThresholds {
        class_stability: 3,
        ..GateThresholds::default()
    });
    engine.arm();
    engine.process(tomato(0.9), &flat());
    for tick in 0..200u32 {
        let pred = if tick % 2 == 0 { tomato(0.9) } else { pepper(0.9) };
        assert!(!engine.process(pred, &produce(tick % 5)).present);
    }
    assert_eq!(engine.last_verdict(), GateVerdict::ClassUnstable);
    assert!(engine.is_armed());
}

#[test]
fn first_detection_after_arming_needs_the_stricter_floor() {
    let engine = Engine::default();
    engine.arm();
    engine.process(tomato(0.9), &flat());

    let ev = engine.process(tomato(0.35), &produce(0));
    assert!(!ev.present);
    assert_eq!(engine.last_verdict(), GateVerdict::LowFirstConfidence);
    assert!(engine.is_armed());

    let ev = engine.process(tomato(0.9), &produce(1));
    assert!(ev.present);
    assert!(!engine.is_armed());

    // Same low confidence once the armed flag is consumed.
    let ev = engine.process(tomato(0.35), &produce(2));
    assert!(ev.present);
    assert_eq!(ev.seq, 2);
}

#[test]
fn wait_times_out_on_schedule() {
    let poll = Duration::from_millis(100);
    let timeout = Duration::from_millis(300);
    let engine = Engine::default().with_poll_interval(poll);
    let token = engine.arm();

    let started = Instant::now();
    let outcome = engine.wait_for_next(token, None, timeout);
    let elapsed = started.elapsed();

    assert_eq!(outcome, WaitOutcome::Timeout);
    assert!(elapsed >= timeout, "returned early after {:?}", elapsed);
    assert!(elapsed <= timeout + poll, "returned late after {:?}", elapsed);
    // Timing out leaves the engine armed.
    assert!(engine.is_armed());
}

#[test]
fn already_saved_seqs_do_not_satisfy_a_wait() {
    let engine = Engine::default().with_poll_interval(Duration::from_millis(10));
    let accepted = sort_one(&engine);
    assert_eq!(accepted.seq, 1);

    let outcome = engine.wait_for_next(0, Some(accepted.seq), Duration::from_millis(50));
    assert_eq!(outcome, WaitOutcome::Timeout);

    let outcome = engine.wait_for_next(0, None, Duration::from_millis(50));
    assert_eq!(outcome.into_event().map(|e| e.seq), Some(1));
}

#[test]
fn armed_wait_returns_the_next_detection() {
    let engine = Arc::new(Engine::default());
    for _ in 0..7 {
        sort_one(&engine);
    }

    let token = engine.arm();
    assert_eq!(token, 7);
    assert!(!engine.peek().present);

    let waiter = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            let outcome = engine.wait_for_next(token, None, Duration::from_secs(12));
            (outcome, Instant::now())
        })
    };

    // Ticks 1-2: empty belt, scene gate fails.
    assert!(!engine.process(tomato(0.9), &flat()).present);
    assert!(!engine.process(tomato(0.9), &flat()).present);
    assert_eq!(engine.last_verdict(), GateVerdict::SceneEmpty);

    // Tick 3: a tomato rolls in.
    let accepted = engine.process(tomato(0.9), &produce(0));
    let accepted_at = Instant::now();
    assert!(accepted.present);
    assert_eq!(accepted.seq, 8);

    let (outcome, returned_at) = waiter.join().unwrap();
    let event = outcome.into_event().expect("detection");
    assert_eq!(event.seq, 8);
    assert_eq!(event.crop_type, "Tomato");
    assert_eq!(event.condition, "Not Damaged");
    assert_eq!(event.color, "Red");
    assert!(returned_at.saturating_duration_since(accepted_at) <= engine.poll_interval() * 2);
}

#[test]
fn concurrent_waiters_all_see_the_same_detection() {
    let engine = Arc::new(Engine::default().with_poll_interval(Duration::from_millis(20)));
    let token = engine.arm();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.wait_for_next(token, None, Duration::from_secs(5)))
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let ev = engine.peek();
                    assert!(!ev.present || ev.seq > token);
                }
            })
        })
        .collect();

    engine.process(tomato(0.9), &flat());
    let accepted = engine.process(tomato(0.9), &produce(0));
    assert!(accepted.present);
    // Later absent ticks overwrite the slot; waiters must still get the event.
    engine.process(RawPrediction::default(), &flat());

    for reader in readers {
        reader.join().unwrap();
    }
    for waiter in waiters {
        let event = waiter.join().unwrap().into_event().expect("detection");
        assert_eq!(event.seq, accepted.seq);
    }
}
