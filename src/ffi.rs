//! FFI bindings for Synheart Pulse
//!
//! C-compatible functions for driving a monitor from a frame loop written in
//! another language. Strings are null-terminated; every returned string is
//! newly allocated and must be freed with `pulse_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::slice;

use crate::config::PulseConfig;
use crate::frame::{ChannelOrder, Frame};
use crate::pipeline::PulseMonitor;
use crate::schema::SampleRecord;
use crate::types::{FaceBox, PulseSnapshot};

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

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn snapshot_to_cstr(snapshot: &PulseSnapshot) -> *mut c_char {
    match serde_json::to_string(snapshot) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Monitor API
// ============================================================================

/// Opaque handle to a PulseMonitor
pub struct PulseMonitorHandle {
    monitor: PulseMonitor,
}

/// Create a new monitor.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string. NULL
///   selects the default configuration.
/// - Must be freed with `pulse_monitor_free`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_monitor_new(config_json: *const c_char) -> *mut PulseMonitorHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        PulseConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match PulseConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match PulseMonitor::with_config(config) {
        Ok(monitor) => Box::into_raw(Box::new(PulseMonitorHandle { monitor })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a monitor.
///
/// # Safety
/// - `monitor` must be a valid pointer returned by `pulse_monitor_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pulse_monitor_free(monitor: *mut PulseMonitorHandle) {
    if !monitor.is_null() {
        drop(Box::from_raw(monitor));
    }
}

/// Process one packed 8-bit 3-channel frame and return the snapshot JSON.
///
/// `channel_order` is 0 for BGR and 1 for RGB. When `has_face` is 0 the face
/// box is ignored and the frame is skipped.
///
/// # Safety
/// - `monitor` must be a valid pointer returned by `pulse_monitor_new`.
/// - `data` must point to `len` readable bytes; `len` must equal
///   `width * height * 3`.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn pulse_monitor_process_frame(
    monitor: *mut PulseMonitorHandle,
    data: *const u8,
    len: usize,
    width: u32,
    height: u32,
    channel_order: i32,
    face_x: i32,
    face_y: i32,
    face_w: i32,
    face_h: i32,
    has_face: i32,
    timestamp: f64,
) -> *mut c_char {
    clear_last_error();

    if monitor.is_null() {
        set_last_error("Null monitor pointer");
        return ptr::null_mut();
    }
    if data.is_null() {
        set_last_error("Null frame data pointer");
        return ptr::null_mut();
    }
    if !timestamp.is_finite() {
        set_last_error(&format!("Invalid timestamp: {timestamp}"));
        return ptr::null_mut();
    }

    let handle = &mut *monitor;

    let order = match ChannelOrder::from_code(channel_order) {
        Some(order) => order,
        None => {
            set_last_error(&format!("Unknown channel order {channel_order}"));
            return ptr::null_mut();
        }
    };

    let bytes = slice::from_raw_parts(data, len).to_vec();
    let frame = match Frame::new(bytes, width as usize, height as usize, order) {
        Ok(frame) => frame,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let face = (has_face != 0).then(|| FaceBox::new(face_x, face_y, face_w, face_h));
    let snapshot = handle.monitor.process_frame(&frame, face, timestamp);
    snapshot_to_cstr(&snapshot)
}

/// Push one `pulse.roi_sample.v1` record and return the snapshot JSON.
///
/// # Safety
/// - `monitor` must be a valid pointer returned by `pulse_monitor_new`.
/// - `record_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_monitor_push_samples(
    monitor: *mut PulseMonitorHandle,
    record_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if monitor.is_null() {
        set_last_error("Null monitor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *monitor;

    let json_str = match cstr_to_string(record_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid record string pointer");
            return ptr::null_mut();
        }
    };

    let record: SampleRecord = match serde_json::from_str(&json_str) {
        Ok(record) => record,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match handle.monitor.push_samples(&record) {
        Ok(snapshot) => snapshot_to_cstr(&snapshot),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Current snapshot JSON without processing anything.
///
/// # Safety
/// - `monitor` must be a valid pointer returned by `pulse_monitor_new`.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_monitor_snapshot(monitor: *mut PulseMonitorHandle) -> *mut c_char {
    clear_last_error();

    if monitor.is_null() {
        set_last_error("Null monitor pointer");
        return ptr::null_mut();
    }

    let handle = &*monitor;
    snapshot_to_cstr(&handle.monitor.snapshot())
}

/// Discard all session state.
///
/// # Safety
/// - `monitor` must be a valid pointer returned by `pulse_monitor_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn pulse_monitor_reset(monitor: *mut PulseMonitorHandle) -> i32 {
    clear_last_error();

    if monitor.is_null() {
        set_last_error("Null monitor pointer");
        return -1;
    }

    let handle = &mut *monitor;
    handle.monitor.reset();
    0
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Pulse functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Pulse function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pulse_free_string(ptr: *mut c_char) {
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
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Pulse function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn pulse_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Pulse library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn pulse_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
