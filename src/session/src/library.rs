use libloading::Library;
use prediction::{codec, Batch, PredictionError, Result, Session, Value};
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    path::{Path, PathBuf},
    ptr, slice,
};

/// Entry point running one request.
pub const SESSION_RUN_SYMBOL: &[u8] = b"prediction_session_run";

/// Entry point releasing a response buffer.
pub const BUFFER_FREE_SYMBOL: &[u8] = b"prediction_buffer_free";

// (request, request_len, &response, &response_len) -> status
type RunFn = unsafe extern "C" fn(*const u8, usize, *mut *mut u8, *mut usize) -> i32;
type FreeFn = unsafe extern "C" fn(*mut u8, usize);

#[derive(Serialize)]
struct RunRequest<'a> {
    feeds: Value,
    fetches: &'a [String],
}

#[derive(Deserialize)]
struct RunResponse {
    outputs: Vec<Value>,
}

/// A [`Session`] backed by an engine shared library.
///
/// The engine receives `{"feeds": {...}, "fetches": [...]}` as JSON with byte values
/// wrapped as `{"b64": ...}`. It answers with a buffer it owns: on status 0 the buffer
/// holds `{"outputs": [...]}`, otherwise an error message.
pub struct LibrarySession {
    run_fn: RunFn,
    free_fn: FreeFn,
    path: PathBuf,
    // keeps the entry points above valid
    #[allow(dead_code)]
    library: Library,
}

impl LibrarySession {
    /// Load the engine library at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let load_error = |e: libloading::Error| {
            PredictionError::failed_to_load_model(format!(
                "Failed to load the model due to bad model data. library {}: {}",
                path.display(),
                e
            ))
        };
        let library = Library::new(path).map_err(load_error)?;
        let (run_fn, free_fn) = unsafe {
            let run_fn: RunFn = *library.get(SESSION_RUN_SYMBOL).map_err(load_error)?;
            let free_fn: FreeFn = *library.get(BUFFER_FREE_SYMBOL).map_err(load_error)?;
            (run_fn, free_fn)
        };
        Ok(LibrarySession::from_entry_points(
            library,
            path.to_path_buf(),
            run_fn,
            free_fn,
        ))
    }

    fn from_entry_points(library: Library, path: PathBuf, run_fn: RunFn, free_fn: FreeFn) -> Self {
        LibrarySession {
            run_fn,
            free_fn,
            path,
            library,
        }
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn call(&self, request: &[u8]) -> (i32, Vec<u8>) {
        let mut buffer: *mut u8 = ptr::null_mut();
        let mut len = 0usize;
        let status =
            unsafe { (self.run_fn)(request.as_ptr(), request.len(), &mut buffer, &mut len) };
        if buffer.is_null() {
            return (status, vec![]);
        }
        let response = unsafe { slice::from_raw_parts(buffer, len) }.to_vec();
        unsafe { (self.free_fn)(buffer, len) };
        (status, response)
    }
}

impl Session for LibrarySession {
    fn run(
        &self,
        feeds: Batch,
        fetches: &[String],
    ) -> std::result::Result<Vec<Value>, Box<dyn Error + Send + Sync>> {
        let request = serde_json::to_vec(&RunRequest {
            feeds: codec::wrap_bytes(Value::Map(feeds)),
            fetches,
        })?;
        let (status, response) = self.call(&request);
        if status != 0 {
            return Err(format!(
                "{} returned status {}: {}",
                self.path.display(),
                status,
                String::from_utf8_lossy(&response)
            )
            .into());
        }
        let response: RunResponse = serde_json::from_slice(&response)?;
        Ok(response
            .outputs
            .into_iter()
            .map(codec::decode)
            .collect::<Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use prediction::ErrorKind;

    #[test]
    fn test_missing_library() {
        let err = LibrarySession::open("/nonexistent/libmodel.so").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::FailedToLoadModel);
        assert!(err.detail().contains("/nonexistent/libmodel.so"));
    }

    #[cfg(target_os = "linux")]
    mod linux {
        use super::*;
        use serde_json::json;

        fn respond(body: Vec<u8>, response: *mut *mut u8, response_len: *mut usize) {
            let body = body.into_boxed_slice();
            unsafe {
                *response_len = body.len();
                *response = Box::into_raw(body) as *mut u8;
            }
        }

        // answers every fetch with the feed of the same name
        unsafe extern "C" fn echo_run(
            request: *const u8,
            request_len: usize,
            response: *mut *mut u8,
            response_len: *mut usize,
        ) -> i32 {
            let request: serde_json::Value =
                serde_json::from_slice(slice::from_raw_parts(request, request_len)).unwrap();
            let outputs: Vec<_> = request["fetches"]
                .as_array()
                .unwrap()
                .iter()
                .map(|fetch| request["feeds"][fetch.as_str().unwrap()].clone())
                .collect();
            respond(
                serde_json::to_vec(&json!({ "outputs": outputs })).unwrap(),
                response,
                response_len,
            );
            0
        }

        unsafe extern "C" fn failing_run(
            _request: *const u8,
            _request_len: usize,
            response: *mut *mut u8,
            response_len: *mut usize,
        ) -> i32 {
            respond(b"out of memory".to_vec(), response, response_len);
            3
        }

        unsafe extern "C" fn free_buffer(buffer: *mut u8, len: usize) {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(buffer, len)));
        }

        fn session(run_fn: RunFn) -> LibrarySession {
            let library = Library::new("libc.so.6").unwrap();
            LibrarySession::from_entry_points(library, PathBuf::from("libc.so.6"), run_fn, free_buffer)
        }

        #[test]
        fn test_missing_symbols() {
            let err = LibrarySession::open("libc.so.6").err().unwrap();
            assert_eq!(err.kind(), ErrorKind::FailedToLoadModel);
            assert!(err.detail().contains("prediction_session_run"));
        }

        #[test]
        fn test_run() {
            let session = session(echo_run);
            let mut feeds = Batch::new();
            feeds.insert(
                "image:0".to_string(),
                Value::List(vec![Value::Bytes(vec![0, 255, 7])]),
            );
            feeds.insert("x:0".to_string(), Value::from(json!([[1.0, 2.0]])));
            let outputs = session
                .run(feeds, &["x:0".to_string(), "image:0".to_string()])
                .unwrap();
            assert_eq!(
                outputs,
                vec![
                    Value::from(json!([[1.0, 2.0]])),
                    Value::List(vec![Value::Bytes(vec![0, 255, 7])]),
                ]
            );
        }

        #[test]
        fn test_run_failure() {
            let session = session(failing_run);
            let err = session
                .run(Batch::new(), &["x:0".to_string()])
                .unwrap_err();
            assert!(err.to_string().contains("returned status 3: out of memory"));
        }
    }
}
