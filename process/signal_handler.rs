use std::{
    process,
    sync::{atomic::AtomicBool, Arc, LazyLock, Mutex},
    thread,
};

use log::{error, trace, warn};
use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use signal_hook::{
    consts::TERM_SIGNALS,
    flag,
    iterator::{exfiltrator::WithOrigin, SignalsInfo},
};

static PID_LIST: LazyLock<Mutex<Vec<i32>>> = LazyLock::new(|| Mutex::new(vec![]));

/// Runs the plugin on its own thread while the calling thread
/// waits for termination signals. A first signal is forwarded to
/// the running executor before exiting. A second one exits at once.
///
/// This should be called once at the start of a binary.
///
/// # Panics
/// Will panic if the signal handlers can't be registered.
pub fn init<F>(app_exec: F)
where
    F: FnOnce() + Send + 'static,
{
    let term_now = Arc::new(AtomicBool::new(false));
    for sig in TERM_SIGNALS {
        // Exits with 1 once `term_now` has been armed by a previous signal
        flag::register_conditional_shutdown(*sig, 1, Arc::clone(&term_now))
            .expect("Register conditional shutdown");
        // Must be registered second or the first signal would already exit
        flag::register(*sig, Arc::clone(&term_now)).expect("Register signal");
    }

    let mut signals = SignalsInfo::<WithOrigin>::new(TERM_SIGNALS).expect("Need signal info");

    thread::spawn(|| {
        let app = thread::spawn(app_exec);

        if app.join().is_ok() {
            process::exit(0);
        } else {
            error!("App thread panic!");
            process::exit(2);
        }
    });

    if let Some(info) = signals.forever().next() {
        warn!("Received termination signal, cleaning up...");
        trace!("{info:#?}");

        send_signal_processes(info.signal);
        process::exit(1);
    }
}

fn send_signal_processes(sig: i32) {
    let Ok(signal) = Signal::try_from(sig) else {
        error!("Cannot forward unknown signal {sig}");
        return;
    };

    let Ok(pid_list) = PID_LIST.lock() else {
        error!("Failed to lock the running process list");
        return;
    };

    for pid in pid_list.iter() {
        if let Err(e) = kill(Pid::from_raw(*pid), signal) {
            error!("Failed to signal process {pid}: Error {e}");
        } else {
            trace!("Sent {signal} to process {pid}");
        }
    }
}

/// Add a pid to the list that receives forwarded signals.
pub fn add_pid<T>(pid: T)
where
    T: TryInto<i32>,
{
    if let (Ok(pid), Ok(mut pid_list)) = (pid.try_into(), PID_LIST.lock()) {
        if !pid_list.contains(&pid) {
            pid_list.push(pid);
        }
    }
}

/// Remove a pid from the list that receives forwarded signals.
pub fn remove_pid<T>(pid: T)
where
    T: TryInto<i32>,
{
    if let (Ok(pid), Ok(mut pid_list)) = (pid.try_into(), PID_LIST.lock()) {
        if let Some(index) = pid_list.iter().position(|val| *val == pid) {
            pid_list.swap_remove(index);
        }
    }
}
