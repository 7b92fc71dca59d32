//! FFI bindings for the stress detection engine
//!
//! C-compatible functions for driving the engine from a host UI runtime.
//! Sessions are addressed by their UUID string. Strings returned by these
//! functions must be freed with `stress_free_string`.
//!
//! Integer-returning functions use 1 for true, 0 for false and -1 for an
//! error; call `stress_last_error` for the message.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use crate::clock::SystemClock;
use crate::config::StressConfig;
use crate::engine::{SessionHandle, SessionSources, StressEngine};
use crate::pin::PinOutcome;
use crate::types::{AccelerationReading, PinEventType, TouchEvent};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn bool_to_i32(value: bool) -> i32 {
    if value {
        1
    } else {
        0
    }
}

/// NaN stands in for a missing axis
fn axis(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

/// Opaque engine handle for FFI
pub struct StressEngineHandle {
    engine: StressEngine,
}

/// Resolve the engine pointer and session id, recording an error on failure
unsafe fn resolve<'a>(
    engine: *mut StressEngineHandle,
    session: *const c_char,
) -> Option<(&'a mut StressEngine, SessionHandle)> {
    if engine.is_null() {
        set_last_error("Null engine pointer");
        return None;
    }
    let handle = &mut *engine;

    let session_str = match cstr_to_string(session) {
        Some(s) => s,
        None => {
            set_last_error("Invalid session string pointer");
            return None;
        }
    };

    match session_str.parse::<SessionHandle>() {
        Ok(id) => Some((&mut handle.engine, id)),
        Err(e) => {
            set_last_error(&e.to_string());
            None
        }
    }
}

// ============================================================================
// Engine lifecycle
// ============================================================================

/// Create an engine.
///
/// # Safety
/// - `config_json` must be NULL (defaults) or a valid null-terminated C string.
/// - Returns NULL on error; call `stress_last_error` to get the error message.
/// - The returned pointer must be freed with `stress_engine_free`.
#[no_mangle]
pub unsafe extern "C" fn stress_engine_new(config_json: *const c_char) -> *mut StressEngineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        StressConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match StressConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let handle = Box::new(StressEngineHandle {
        engine: StressEngine::new(config, Arc::new(SystemClock)),
    });
    Box::into_raw(handle)
}

/// Free an engine and stop all of its sessions.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stress_engine_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn stress_engine_free(engine: *mut StressEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

// ============================================================================
// Session lifecycle
// ============================================================================

/// Start a session fed through the push functions below.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stress_engine_new`.
/// - Returns the session id as a newly allocated string (free with `stress_free_string`).
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn stress_session_start(engine: *mut StressEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }

    let handle = &mut *engine;
    let session = handle.engine.start_session(SessionSources::none());
    string_to_cstr(&session.to_string())
}

/// Stop a session. Stopping twice is not an error.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stress_engine_new`.
/// - `session` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn stress_session_stop(
    engine: *mut StressEngineHandle,
    session: *const c_char,
) -> i32 {
    clear_last_error();

    let Some((engine, id)) = resolve(engine, session) else {
        return -1;
    };
    match engine.stop_session(id) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Stop a session and discard it.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stress_engine_new`.
/// - `session` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn stress_session_release(
    engine: *mut StressEngineHandle,
    session: *const c_char,
) -> i32 {
    clear_last_error();

    let Some((engine, id)) = resolve(engine, session) else {
        return -1;
    };
    match engine.release(id) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Input
// ============================================================================

/// Push an acceleration-including-gravity reading. Pass NaN for a missing axis.
/// A negative `timestamp_ms` uses the engine clock.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stress_engine_new`.
/// - `session` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn stress_session_push_motion(
    engine: *mut StressEngineHandle,
    session: *const c_char,
    x: f64,
    y: f64,
    z: f64,
    timestamp_ms: i64,
) -> i32 {
    clear_last_error();

    let Some((engine, id)) = resolve(engine, session) else {
        return -1;
    };
    let reading = AccelerationReading {
        x: axis(x),
        y: axis(y),
        z: axis(z),
        timestamp_ms: u64::try_from(timestamp_ms).ok(),
    };
    match engine.push_motion(id, &reading) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Push a touch point. A negative `timestamp_ms` uses the engine clock.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stress_engine_new`.
/// - `session` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn stress_session_push_touch(
    engine: *mut StressEngineHandle,
    session: *const c_char,
    x: f64,
    y: f64,
    timestamp_ms: i64,
) -> i32 {
    clear_last_error();

    let Some((engine, id)) = resolve(engine, session) else {
        return -1;
    };
    let event = TouchEvent {
        x: axis(x),
        y: axis(y),
        timestamp_ms: u64::try_from(timestamp_ms).ok(),
    };
    match engine.push_touch(id, &event) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Report a PIN edit (`"change"`, `"delete"` or `"submit"`).
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stress_engine_new`.
/// - `session` and `event_type` must be valid null-terminated C strings.
/// - Returns 1 if this event declared an anomaly, 0 otherwise, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn stress_session_report_pin(
    engine: *mut StressEngineHandle,
    session: *const c_char,
    event_type: *const c_char,
    current_length: u32,
) -> i32 {
    clear_last_error();

    let Some((engine, id)) = resolve(engine, session) else {
        return -1;
    };
    let event_type = match cstr_to_string(event_type).map(|s| s.parse::<PinEventType>()) {
        Some(Ok(t)) => t,
        Some(Err(e)) => {
            set_last_error(&e.to_string());
            return -1;
        }
        None => {
            set_last_error("Invalid event type string pointer");
            return -1;
        }
    };

    match engine.report_pin_event(id, event_type, current_length) {
        Ok(outcome) => bool_to_i32(matches!(outcome, PinOutcome::Anomaly { .. })),
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Drive the session: ingest queued input and run the scoring tick if due.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stress_engine_new`.
/// - `session` must be a valid null-terminated C string.
/// - Returns 1 if a tick ran, 0 otherwise, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn stress_session_poll(
    engine: *mut StressEngineHandle,
    session: *const c_char,
) -> i32 {
    clear_last_error();

    let Some((engine, id)) = resolve(engine, session) else {
        return -1;
    };
    match engine.poll(id) {
        Ok(outcome) => bool_to_i32(outcome.ticked),
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// Latest metrics snapshot as JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stress_engine_new`.
/// - `session` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `stress_free_string`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn stress_session_metrics_json(
    engine: *mut StressEngineHandle,
    session: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some((engine, id)) = resolve(engine, session) else {
        return ptr::null_mut();
    };
    let metrics = match engine.get_metrics(id) {
        Ok(m) => m,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };
    match serde_json::to_string(&metrics) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Whether a shake is pending.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stress_engine_new`.
/// - `session` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn stress_session_shake_detected(
    engine: *mut StressEngineHandle,
    session: *const c_char,
) -> i32 {
    clear_last_error();

    let Some((engine, id)) = resolve(engine, session) else {
        return -1;
    };
    match engine.is_shake_detected(id) {
        Ok(detected) => bool_to_i32(detected),
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Read and clear the shake flag.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stress_engine_new`.
/// - `session` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn stress_session_consume_shake(
    engine: *mut StressEngineHandle,
    session: *const c_char,
) -> i32 {
    clear_last_error();

    let Some((engine, id)) = resolve(engine, session) else {
        return -1;
    };
    match engine.consume_shake(id) {
        Ok(detected) => bool_to_i32(detected),
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Whether the session is monitoring.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `stress_engine_new`.
/// - `session` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn stress_session_is_monitoring(
    engine: *mut StressEngineHandle,
    session: *const c_char,
) -> i32 {
    clear_last_error();

    let Some((engine, id)) = resolve(engine, session) else {
        return -1;
    };
    match engine.is_monitoring(id) {
        Ok(monitoring) => bool_to_i32(monitoring),
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by engine functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an engine function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn stress_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - The returned pointer is valid until the next engine call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn stress_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn stress_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        stress_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_session_lifecycle() {
        unsafe {
            let engine = stress_engine_new(ptr::null());
            assert!(!engine.is_null());

            let session = CString::new(take_string(stress_session_start(engine))).unwrap();
            assert_eq!(stress_session_is_monitoring(engine, session.as_ptr()), 1);

            assert_eq!(
                stress_session_push_motion(engine, session.as_ptr(), 0.1, 9.7, 0.3, -1),
                0
            );
            assert_eq!(
                stress_session_push_touch(engine, session.as_ptr(), 120.0, 300.0, -1),
                0
            );
            assert!(stress_session_poll(engine, session.as_ptr()) >= 0);

            let metrics = take_string(stress_session_metrics_json(engine, session.as_ptr()));
            let value: serde_json::Value = serde_json::from_str(&metrics).unwrap();
            assert!(value["overall_score"].is_number());

            assert_eq!(stress_session_stop(engine, session.as_ptr()), 0);
            assert_eq!(stress_session_stop(engine, session.as_ptr()), 0);
            assert_eq!(stress_session_is_monitoring(engine, session.as_ptr()), 0);

            assert_eq!(stress_session_release(engine, session.as_ptr()), 0);
            assert_eq!(stress_session_is_monitoring(engine, session.as_ptr()), -1);

            stress_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_pin_anomaly() {
        unsafe {
            // Zero debounce lets the cycles run back to back on the wall clock
            let config = CString::new(r#"{"pin_abort_debounce_ms": 0}"#).unwrap();
            let engine = stress_engine_new(config.as_ptr());
            assert!(!engine.is_null());

            let session = CString::new(take_string(stress_session_start(engine))).unwrap();
            let change = CString::new("change").unwrap();
            let delete = CString::new("delete").unwrap();

            let mut last = 0;
            for _ in 0..3 {
                stress_session_report_pin(engine, session.as_ptr(), change.as_ptr(), 1);
                last = stress_session_report_pin(engine, session.as_ptr(), delete.as_ptr(), 0);
            }
            assert_eq!(last, 1);
            assert_eq!(stress_session_shake_detected(engine, session.as_ptr()), 1);
            assert_eq!(stress_session_consume_shake(engine, session.as_ptr()), 1);
            assert_eq!(stress_session_shake_detected(engine, session.as_ptr()), 0);

            stress_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let engine = stress_engine_new(ptr::null());
            let bogus = CString::new("not-a-session").unwrap();

            assert_eq!(stress_session_poll(engine, bogus.as_ptr()), -1);
            let error = stress_last_error();
            assert!(!error.is_null());
            assert!(!CStr::from_ptr(error).to_str().unwrap().is_empty());

            let session = CString::new(take_string(stress_session_start(engine))).unwrap();
            let paste = CString::new("paste").unwrap();
            assert_eq!(
                stress_session_report_pin(engine, session.as_ptr(), paste.as_ptr(), 1),
                -1
            );

            assert_eq!(stress_session_poll(ptr::null_mut(), session.as_ptr()), -1);

            let bad_config = CString::new(r#"{"touch_capacity": 0}"#).unwrap();
            assert!(stress_engine_new(bad_config.as_ptr()).is_null());

            stress_engine_free(engine);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = stress_version();
            assert!(!version.is_null());
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
