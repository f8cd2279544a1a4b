// The input monitor runs off a 50 ms tick. A keystroke held for a fraction of
// a second is observed on several consecutive ticks, which is exactly why the
// recovery path needs its 200 ms debounce window.
#[test]
fn held_key_spans_multiple_ticks() {
    let tick = std::time::Duration::from_millis(50);
    let hold = std::time::Duration::from_millis(220);
    let pressed_at = std::time::Instant::now();

    let mut observations = 0;
    let mut elapsed = std::time::Duration::ZERO;
    while elapsed < hold {
        // Each tick sees the key still down.
        observations += 1;
        elapsed += tick;
    }

    assert!(
        observations >= 3,
        "a {hold:?} press should span at least 3 ticks, saw {observations}"
    );
    assert!(pressed_at.elapsed() < hold, "simulation must not sleep");
}
