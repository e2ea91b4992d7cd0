// Copyright (c) Facebook, Inc. and its affiliates.
use chrono::{DateTime, Local};
use log::info;
use simplelog as sl;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, UNIX_EPOCH};

pub mod json_file;

pub use json_file::{JsonArgs, JsonArgsHelper, JsonConfigFile, JsonLoad, JsonReportFile, JsonSave};

pub fn unix_now() -> u64 {
    UNIX_EPOCH.elapsed().unwrap().as_secs()
}

pub fn format_unix_time(time: u64) -> String {
    DateTime::<Local>::from(UNIX_EPOCH + Duration::from_secs(time))
        .format("%x %T")
        .to_string()
}

/// Local timestamp suitable for embedding in file names.
pub fn format_time_filename(time: u64) -> String {
    DateTime::<Local>::from(UNIX_EPOCH + Duration::from_secs(time))
        .format("%Y-%m-%d-%H-%M-%S")
        .to_string()
}

pub fn init_logging(verbosity: u32) {
    if std::env::var("RUST_LOG").is_ok() {
        env_logger::init();
    } else {
        let sl_level = match verbosity {
            0 | 1 => sl::LevelFilter::Info,
            2 => sl::LevelFilter::Debug,
            _ => sl::LevelFilter::Trace,
        };
        let mut lcfg = sl::ConfigBuilder::new();
        lcfg.set_time_level(sl::LevelFilter::Off)
            .set_location_level(sl::LevelFilter::Off)
            .set_target_level(sl::LevelFilter::Off)
            .set_thread_level(sl::LevelFilter::Off);
        if !console::user_attended_stderr()
            || sl::TermLogger::init(
                sl_level,
                lcfg.build(),
                sl::TerminalMode::Stderr,
                sl::ColorChoice::Auto,
            )
            .is_err()
        {
            sl::SimpleLogger::init(sl_level, lcfg.build()).unwrap();
        }
    }
}

struct GlobalProgState {
    exiting: bool,
}

lazy_static::lazy_static! {
    static ref PROG_STATE: Mutex<GlobalProgState> =
        Mutex::new(GlobalProgState { exiting: false });
    static ref PROG_WAITQ: Condvar = Condvar::new();
}

pub fn setup_prog_state() {
    ctrlc::set_handler(move || {
        info!("SIGINT/TERM received, exiting...");
        set_prog_exiting();
    })
    .expect("Error setting term handler");
}

pub fn set_prog_exiting() {
    PROG_STATE.lock().unwrap().exiting = true;
    PROG_WAITQ.notify_all();
}

pub fn prog_exiting() -> bool {
    PROG_STATE.lock().unwrap().exiting
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgState {
    Running,
    Exiting,
}

/// Interruptible sleep. Returns early with ProgState::Exiting when an exit
/// signal arrives while waiting.
pub fn wait_prog_state(dur: Duration) -> ProgState {
    let state = PROG_STATE.lock().unwrap();
    if state.exiting {
        return ProgState::Exiting;
    }
    let (state, _timeout) = PROG_WAITQ.wait_timeout(state, dur).unwrap();
    if state.exiting {
        ProgState::Exiting
    } else {
        ProgState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time_filename() {
        let s = format_time_filename(0);
        // Exact rendering depends on the local timezone, only check shape.
        assert_eq!(s.len(), "1970-01-01-00-00-00".len());
        assert_eq!(s.matches('-').count(), 5);
    }

    #[test]
    fn test_wait_prog_state_runs() {
        assert_eq!(
            wait_prog_state(Duration::from_millis(1)),
            ProgState::Running
        );
    }
}
