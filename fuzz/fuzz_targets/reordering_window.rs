//! Fuzz target for ReorderingWindow
//!
//! Applies arbitrary stream numbers to a window and to a simple model that
//! remembers every number ever marked.
//!
//! # Invariants
//!
//! - A number marked once is never accepted again
//! - `unseen()` yields exactly the in-window numbers `is_seen` rejects not
//! - The centre never moves backwards

#![no_main]

use std::collections::HashSet;

use briar_transport::ReorderingWindow;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|numbers: Vec<u16>| {
    let mut window = ReorderingWindow::new();
    let mut marked = HashSet::new();

    for number in numbers {
        let number = u64::from(number);
        let centre = window.centre();

        let newly = window.set_seen(number);
        if marked.contains(&number) {
            assert!(!newly, "stream {number} accepted twice");
        }
        if newly {
            marked.insert(number);
        }
        assert!(window.centre() >= centre);

        for candidate in window.unseen() {
            assert!(!window.is_seen(candidate));
            assert!(!marked.contains(&candidate));
        }
    }
});
