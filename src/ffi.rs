// FFI bindings for C/C++/C#
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::slice;

use crate::{InitStatus, PixelBuffer, TextScanner};

/// Opaque handle to a scanner instance
pub struct TScanHandle {
    inner: TextScanner,
}

unsafe fn path_arg(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(str::to_string)
}

unsafe fn bytes_arg<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
    if ptr.is_null() || len == 0 {
        return None;
    }
    Some(slice::from_raw_parts(ptr, len))
}

unsafe fn into_handle(scanner: TextScanner, status_out: *mut c_int) -> *mut TScanHandle {
    let status = scanner
        .init_error()
        .map_or(InitStatus::Ok, |e| e.status());
    if !status_out.is_null() {
        *status_out = status as c_int;
    }
    if status != InitStatus::Ok {
        return std::ptr::null_mut();
    }
    Box::into_raw(Box::new(TScanHandle { inner: scanner }))
}

/// Create a scanner from model and dictionary files
///
/// Returns null when initialization fails; the reason is written to
/// `status_out` when it is not null (see `InitStatus`).
///
/// # Safety
/// All string pointers must be valid null-terminated UTF-8 strings
#[no_mangle]
pub unsafe extern "C" fn tscan_new_from_files(
    det_model_path: *const c_char,
    rec_model_path: *const c_char,
    dict_path: *const c_char,
    status_out: *mut c_int,
) -> *mut TScanHandle {
    let status = match (
        path_arg(det_model_path),
        path_arg(rec_model_path),
        path_arg(dict_path),
    ) {
        (Some(det), Some(rec), Some(dict)) => {
            return into_handle(TextScanner::from_files(det, rec, dict), status_out);
        }
        (Some(_), Some(_), None) => InitStatus::DictionaryNotFound,
        _ => InitStatus::ModelNotFound,
    };

    if !status_out.is_null() {
        *status_out = status as c_int;
    }
    std::ptr::null_mut()
}

/// Create a scanner from in-memory models and dictionary
///
/// The buffers are copied; the caller keeps ownership.
///
/// # Safety
/// Each pointer must reference at least the given number of readable bytes
#[no_mangle]
pub unsafe extern "C" fn tscan_new_from_memory(
    rec_model: *const u8,
    rec_model_len: usize,
    dict: *const u8,
    dict_len: usize,
    det_model: *const u8,
    det_model_len: usize,
    status_out: *mut c_int,
) -> *mut TScanHandle {
    let rec = bytes_arg(rec_model, rec_model_len).unwrap_or_default();
    let dict = bytes_arg(dict, dict_len).unwrap_or_default();
    let det = bytes_arg(det_model, det_model_len).unwrap_or_default();

    into_handle(TextScanner::from_memory(rec, dict, det), status_out)
}

/// Initialization status of a scanner, 0 when ready
///
/// # Safety
/// handle must be null or a valid pointer returned from tscan_new_*
#[no_mangle]
pub unsafe extern "C" fn tscan_init_status(handle: *const TScanHandle) -> c_int {
    if handle.is_null() {
        return -1;
    }
    (*handle)
        .inner
        .init_error()
        .map_or(InitStatus::Ok, |e| e.status()) as c_int
}

/// Scan a BGR or BGRA bitmap
///
/// Returns the recognized strings joined with tabs as a heap C string, which
/// must be released with tscan_free_string. Returns null on bad arguments.
///
/// # Safety
/// - handle must be a valid pointer returned from tscan_new_*
/// - data must reference `stride * height` readable bytes
#[no_mangle]
pub unsafe extern "C" fn tscan_scan(
    handle: *mut TScanHandle,
    data: *const u8,
    width: u32,
    height: u32,
    channels: u32,
    stride: usize,
    skip_detection: c_int,
) -> *mut c_char {
    if handle.is_null() || data.is_null() || channels > u8::MAX as u32 {
        return std::ptr::null_mut();
    }

    let scanner = &mut (*handle).inner;
    let len = stride.saturating_mul(height as usize);
    let pixels = slice::from_raw_parts(data, len);
    let image = PixelBuffer::new(width, height, channels as u8, stride, pixels);

    let text = scanner.scan(&image, skip_detection != 0);
    // Recognized text never carries NUL; strip it rather than fail
    let text = text.replace('\0', "");
    match CString::new(text) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Free a string returned from tscan_scan
///
/// # Safety
/// s must be null or a pointer returned from tscan_scan
#[no_mangle]
pub unsafe extern "C" fn tscan_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Free a scanner instance
///
/// # Safety
/// handle must be null or a valid pointer returned from tscan_new_*
#[no_mangle]
pub unsafe extern "C" fn tscan_free(handle: *mut TScanHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Get library version
#[no_mangle]
pub extern "C" fn tscan_version() -> *const c_char {
    static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}
