// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn latch(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

/// Install INT/TERM/HUP handlers that latch the shutdown flag. The main
/// loop polls `triggered` and turns the latch into a relay shutdown.
pub fn register() {
    unsafe {
        libc::signal(libc::SIGINT, latch as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, latch as *const () as libc::sighandler_t);
        libc::signal(libc::SIGHUP, latch as *const () as libc::sighandler_t);
    }
}

pub fn triggered() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}
