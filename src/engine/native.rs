//! FFI bindings to the engine libraries
//!
//! Links `sumoscheduler` and `DMQClient` at build time; `build.rs` adds
//! `SUMO_PATH` to the native search path when the variable is set.
//!
//! The scheduler library keeps a single process-wide slot per callback kind.
//! The trampolines below forward into whichever [`EventSink`] was registered
//! last, so only one [`NativeEngine`] should be live in a process.

use super::{QueueEngine, SchedulerEngine};
use crate::dispatch::EventSink;
use crate::lock;
use crate::types::JobId;
use std::ffi::{c_char, c_int, CStr, CString};
use std::sync::{Mutex, OnceLock};

mod ffi {
    use std::ffi::{c_char, c_int};

    pub type Callback = extern "C" fn(c_int, *const c_char) -> c_int;

    #[link(name = "sumoscheduler")]
    extern "C" {
        pub fn schedule(
            model: *const c_char,
            commands: *const c_char,
            variables: *const c_char,
            block_datacomm: c_int,
        ) -> c_int;
        pub fn finish(job: c_int);
        #[link_name = "sendCommand"]
        pub fn send_command(job: c_int, command: *const c_char);
        #[link_name = "setParallelJobs"]
        pub fn set_parallel_jobs(jobs: c_int);
        #[link_name = "setMaxJobReuse"]
        pub fn set_max_job_reuse(reuse: c_int);
        #[link_name = "setLogDetails"]
        pub fn set_log_details(level: c_int);
        #[link_name = "getScheduledJobs"]
        pub fn get_scheduled_jobs() -> c_int;
        #[link_name = "getVersion"]
        pub fn get_version() -> c_int;
        pub fn cleanup();
        pub fn register_message_callback(callback: Callback);
        pub fn register_datacomm_callback(callback: Callback);
    }

    #[link(name = "DMQClient")]
    extern "C" {
        #[link_name = "initModule"]
        pub fn init_module(client_name: *const c_char);
        #[link_name = "createQueue"]
        pub fn create_queue() -> *const c_char;
        #[link_name = "createSpecQueue"]
        pub fn create_spec_queue(key: *const c_char) -> *const c_char;
        #[link_name = "openQueue"]
        pub fn open_queue(key: *const c_char) -> *const c_char;
        #[link_name = "sendText"]
        pub fn send_text(key: *const c_char, text: *const c_char) -> c_int;
        #[link_name = "getText"]
        pub fn get_text(key: *const c_char, blocking: c_int) -> *const c_char;
        #[link_name = "closeQueue"]
        pub fn close_queue(key: *const c_char);
        #[link_name = "applyLicense"]
        pub fn apply_license(path: *const c_char) -> *const c_char;
        #[link_name = "getVersion"]
        pub fn dmq_get_version() -> c_int;
    }
}

static SINK: OnceLock<Mutex<Option<EventSink>>> = OnceLock::new();

fn sink_slot() -> &'static Mutex<Option<EventSink>> {
    SINK.get_or_init(|| Mutex::new(None))
}

/// Interior NULs cannot cross the C boundary; they are stripped
fn c_string(text: &str) -> CString {
    CString::new(text.replace('\0', "")).unwrap_or_default()
}

/// Copy an engine-owned string; null maps to `None`
fn from_c(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: the engine hands out NUL-terminated strings that stay valid
    // until its next call on the same thread; we copy immediately.
    let text = unsafe { CStr::from_ptr(ptr) };
    Some(text.to_string_lossy().into_owned())
}

extern "C" fn message_trampoline(job: c_int, text: *const c_char) -> c_int {
    let text = from_c(text);
    match lock(sink_slot()).as_ref() {
        Some(sink) => sink.message(job, text.as_deref()),
        None => 0,
    }
}

extern "C" fn datacomm_trampoline(job: c_int, raw: *const c_char) -> c_int {
    let raw = from_c(raw).unwrap_or_default();
    match lock(sink_slot()).as_ref() {
        Some(sink) => sink.datacomm(job, &raw),
        None => 0,
    }
}

/// Scheduler library bindings
#[derive(Debug, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

impl SchedulerEngine for NativeEngine {
    fn schedule(&self, model: &str, commands: &str, variables: &str, block_datacomm: bool) -> JobId {
        let model = c_string(model);
        let commands = c_string(commands);
        let variables = c_string(variables);
        // SAFETY: all pointers come from live CStrings
        unsafe {
            ffi::schedule(
                model.as_ptr(),
                commands.as_ptr(),
                variables.as_ptr(),
                c_int::from(block_datacomm),
            )
        }
    }

    fn finish(&self, job: JobId) {
        unsafe { ffi::finish(job) }
    }

    fn send_command(&self, job: JobId, command: &str) {
        let command = c_string(command);
        unsafe { ffi::send_command(job, command.as_ptr()) }
    }

    fn set_parallel_jobs(&self, jobs: i32) {
        unsafe { ffi::set_parallel_jobs(jobs) }
    }

    fn set_max_job_reuse(&self, reuse: i32) {
        unsafe { ffi::set_max_job_reuse(reuse) }
    }

    fn set_log_details(&self, level: i32) {
        unsafe { ffi::set_log_details(level) }
    }

    fn scheduled_jobs(&self) -> i32 {
        unsafe { ffi::get_scheduled_jobs() }
    }

    fn version(&self) -> i32 {
        unsafe { ffi::get_version() }
    }

    fn cleanup(&self) {
        unsafe { ffi::cleanup() }
    }

    fn register_callbacks(&self, sink: EventSink) {
        *lock(sink_slot()) = Some(sink);
        // SAFETY: the trampolines are plain functions with 'static lifetime
        unsafe {
            ffi::register_message_callback(message_trampoline);
            ffi::register_datacomm_callback(datacomm_trampoline);
        }
        tracing::debug!("Native callbacks registered");
    }
}

/// Message-queue library bindings
#[derive(Debug, Default)]
pub struct NativeQueueEngine;

impl NativeQueueEngine {
    pub fn new() -> Self {
        Self
    }
}

impl QueueEngine for NativeQueueEngine {
    fn init_module(&self, client_name: &str) {
        let name = c_string(client_name);
        unsafe { ffi::init_module(name.as_ptr()) }
    }

    fn create_queue(&self) -> String {
        from_c(unsafe { ffi::create_queue() }).unwrap_or_default()
    }

    fn create_specific_queue(&self, key: &str) -> String {
        let key = c_string(key);
        from_c(unsafe { ffi::create_spec_queue(key.as_ptr()) }).unwrap_or_default()
    }

    fn open_queue(&self, key: &str) -> String {
        let key = c_string(key);
        from_c(unsafe { ffi::open_queue(key.as_ptr()) }).unwrap_or_default()
    }

    fn send_text(&self, key: &str, text: &str) -> i32 {
        let key = c_string(key);
        let text = c_string(text);
        unsafe { ffi::send_text(key.as_ptr(), text.as_ptr()) }
    }

    fn get_text(&self, key: &str, blocking: bool) -> String {
        let key = c_string(key);
        from_c(unsafe { ffi::get_text(key.as_ptr(), c_int::from(blocking)) }).unwrap_or_default()
    }

    fn close_queue(&self, key: &str) {
        let key = c_string(key);
        unsafe { ffi::close_queue(key.as_ptr()) }
    }

    fn version(&self) -> i32 {
        unsafe { ffi::dmq_get_version() }
    }

    fn apply_license(&self, path: &str) -> String {
        let path = c_string(path);
        from_c(unsafe { ffi::apply_license(path.as_ptr()) }).unwrap_or_default()
    }
}
