//! Terminal interrupts for running scripts
//!
//! Scripts run in their own process group, so a Ctrl-C from the terminal
//! only reaches the harness. While at least one script is running, SIGINT
//! and SIGTERM are passed on to every registered script group and then to
//! whichever handler was installed before. With the default disposition the
//! harness still terminates as usual. The previous handlers come back once
//! the last script has finished.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

const SIGNALS: [libc::c_int; 2] = [libc::SIGINT, libc::SIGTERM];

/// Scripts running at the same time that can receive interrupts.
const MAX_GROUPS: usize = 64;

// read from the signal handler, so lock-free
static GROUPS: [AtomicI32; MAX_GROUPS] = [const { AtomicI32::new(0) }; MAX_GROUPS];
static PREVIOUS_HANDLER: [AtomicUsize; 2] = [const { AtomicUsize::new(libc::SIG_DFL) }; 2];
static PREVIOUS_FLAGS: [AtomicI32; 2] = [const { AtomicI32::new(0) }; 2];

struct Installed {
    active: usize,
    previous: [Option<libc::sigaction>; 2],
}

static INSTALLED: Mutex<Installed> = Mutex::new(Installed {
    active: 0,
    previous: [None, None],
});

/// A script group receiving interrupts. Unregisters on drop.
pub(crate) struct Registration {
    slot: usize,
}

/// Starts passing interrupts to `pgid`.
///
/// Returns `None` when every slot is taken; that script then runs without
/// interrupt forwarding.
pub(crate) fn register(pgid: u32) -> Option<Registration> {
    let pgid = libc::pid_t::try_from(pgid).ok()?;
    let mut installed = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);

    let Some(slot) = GROUPS.iter().position(|group| {
        group
            .compare_exchange(0, pgid, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }) else {
        debug!(pgid, "no free interrupt slot, script will not receive interrupts");
        return None;
    };

    if installed.active == 0 {
        install(&mut installed);
    }
    installed.active += 1;
    Some(Registration { slot })
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut installed = INSTALLED.lock().unwrap_or_else(PoisonError::into_inner);
        GROUPS[self.slot].store(0, Ordering::SeqCst);
        installed.active -= 1;
        if installed.active == 0 {
            restore(&mut installed);
        }
    }
}

fn install(installed: &mut Installed) {
    for (i, &sig) in SIGNALS.iter().enumerate() {
        // SAFETY: sigaction with a zeroed struct only reads the current
        // action. The installed handler only makes async-signal-safe calls
        // and reads atomics.
        unsafe {
            let mut previous: libc::sigaction = std::mem::zeroed();
            if libc::sigaction(sig, std::ptr::null(), &mut previous) != 0 {
                debug!(sig, error = %std::io::Error::last_os_error(), "reading signal action failed");
                continue;
            }
            PREVIOUS_HANDLER[i].store(previous.sa_sigaction, Ordering::SeqCst);
            PREVIOUS_FLAGS[i].store(previous.sa_flags, Ordering::SeqCst);

            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = forward
                as extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void)
                as libc::sighandler_t;
            action.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(sig, &action, std::ptr::null_mut()) != 0 {
                debug!(sig, error = %std::io::Error::last_os_error(), "installing signal action failed");
                continue;
            }
            installed.previous[i] = Some(previous);
        }
    }
}

fn restore(installed: &mut Installed) {
    for (i, &sig) in SIGNALS.iter().enumerate() {
        if let Some(previous) = installed.previous[i].take() {
            // SAFETY: puts back the action read in install()
            let rc = unsafe { libc::sigaction(sig, &previous, std::ptr::null_mut()) };
            if rc != 0 {
                debug!(sig, error = %std::io::Error::last_os_error(), "restoring signal action failed");
            }
        }
    }
}

extern "C" fn forward(sig: libc::c_int, info: *mut libc::siginfo_t, context: *mut libc::c_void) {
    for group in &GROUPS {
        let pgid = group.load(Ordering::SeqCst);
        if pgid > 0 {
            // SAFETY: killpg is async-signal-safe
            unsafe { libc::killpg(pgid, sig) };
        }
    }

    let Some(i) = SIGNALS.iter().position(|&s| s == sig) else {
        return;
    };
    let handler = PREVIOUS_HANDLER[i].load(Ordering::SeqCst);
    let flags = PREVIOUS_FLAGS[i].load(Ordering::SeqCst);
    match handler {
        libc::SIG_IGN => {}
        // the signal is blocked while this handler runs, so the re-raised
        // one is delivered to the default action right after it returns
        libc::SIG_DFL => unsafe {
            let mut default: libc::sigaction = std::mem::zeroed();
            default.sa_sigaction = libc::SIG_DFL;
            libc::sigaction(sig, &default, std::ptr::null_mut());
            libc::raise(sig);
        },
        // SAFETY: the value came from sigaction with SA_SIGINFO set
        handler if flags & libc::SA_SIGINFO != 0 => unsafe {
            let previous: extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void) =
                std::mem::transmute(handler);
            previous(sig, info, context);
        },
        // SAFETY: the value came from sigaction without SA_SIGINFO
        handler => unsafe {
            let previous: extern "C" fn(libc::c_int) = std::mem::transmute(handler);
            previous(sig);
        },
    }
}
