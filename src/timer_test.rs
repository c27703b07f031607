use super::*;

const T0: Timestamp = 1_700_000_000_000;

#[test]
fn remaining_counts_down_from_anchor() {
    let mut timer = TimerReconciler::new(60);
    timer.start(T0);
    assert_eq!(timer.remaining(T0), 60);
    assert_eq!(timer.remaining(T0 + 45_000), 15);
    assert_eq!(timer.remaining(T0 + 61_000), 0);
    assert!(timer.expired(T0 + 61_000));
}

#[test]
fn partial_seconds_round_up_until_deadline() {
    let mut timer = TimerReconciler::new(60);
    timer.start(T0);
    assert_eq!(timer.remaining(T0 + 59_001), 1);
    assert!(!timer.expired(T0 + 59_999));
    assert_eq!(timer.remaining(T0 + 60_000), 0);
    assert!(timer.expired(T0 + 60_000));
}

#[test]
fn remaining_is_clamped_before_anchor_and_long_after() {
    assert_eq!(remaining_secs(T0, 30, T0 - 10_000), 30);
    assert_eq!(remaining_secs(T0, 30, i64::MIN), 30);
    assert_eq!(remaining_secs(T0, 30, T0 + 86_400_000), 0);
    assert_eq!(remaining_secs(T0, 30, i64::MAX), 0);
}

#[test]
fn remaining_is_monotonically_non_increasing() {
    let mut previous = u32::MAX;
    for offset in (-5_000..70_000).step_by(250) {
        let current = remaining_secs(T0, 60, T0 + offset);
        assert!(current <= previous, "remaining rose at offset {offset}");
        assert!(current <= 60);
        previous = current;
    }
}

#[test]
fn unanchored_timer_reports_full_duration_and_never_expires() {
    let timer = TimerReconciler::new(45);
    assert_eq!(timer.started_at(), None);
    assert_eq!(timer.remaining(T0), 45);
    assert!(!timer.expired(i64::MAX));
}

#[test]
fn clear_drops_anchor_and_restart_replaces_it() {
    let mut timer = TimerReconciler::new(10);
    timer.start(T0);
    timer.start(T0 + 5_000);
    assert_eq!(timer.remaining(T0 + 5_000), 10);
    timer.clear();
    assert_eq!(timer.started_at(), None);
    assert_eq!(timer.duration_secs(), 10);
}

#[test]
fn zero_duration_is_expired_as_soon_as_anchored() {
    let mut timer = TimerReconciler::new(0);
    timer.start(T0);
    assert_eq!(timer.remaining(T0), 0);
    assert!(timer.expired(T0));
}
