// Simulates the bounded window-search retry loop: a window that never shows
// up must spend the whole attempt budget and stop, never loop forever.
#[test]
fn find_retry_terminates_after_budget() {
    let max_attempts = 20u32;
    let retry_delay = std::time::Duration::from_millis(2);
    let start = std::time::Instant::now();

    let mut attempt = 0;
    loop {
        let found = false; // the window never appears
        if found {
            break;
        }
        attempt += 1;
        if attempt >= max_attempts {
            break;
        }
        std::thread::sleep(retry_delay);
    }

    assert_eq!(attempt, max_attempts);
    assert!(start.elapsed() >= retry_delay * (max_attempts - 1));
}
