// Runtime bindings for the native AEC3 library
//
// The library is loaded with libloading rather than linked, so the binary
// runs (with synthetic or file input) on machines without it until a
// canceller is actually requested.

use std::ffi::{c_int, c_void};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, info, warn};

use super::{CancellerConfig, CancellerFactory, EchoCanceller};
use crate::audio::types::{AecError, Result, FRAMES_PER_SECOND, LINEAR_FRAME_SAMPLES};

/// Configuration block passed to `aec3_create`
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Aec3Config {
    sample_rate: c_int,
    num_channels: c_int,
    export_linear: c_int,
}

type FnCreate = unsafe extern "C" fn(*const Aec3Config) -> *mut c_void;
type FnProcessFrame = unsafe extern "C" fn(
    *mut c_void,  // handle
    *const i16,   // reference frame
    *const i16,   // capture frame
    *mut i16,     // output frame
    *mut i16,     // linear output frame, null when disabled
    usize,        // samples per channel
    c_int,        // buffer delay in samples
) -> c_int;
type FnDestroy = unsafe extern "C" fn(*mut c_void);

/// Base name of the shared library
const LIBRARY_NAME: &str = "aec3";

/// Platform-specific file names tried when no explicit path is given
pub fn candidate_library_names() -> Vec<String> {
    let mut names = Vec::new();
    if cfg!(target_os = "macos") {
        names.push(format!("{}.dylib", LIBRARY_NAME));
        names.push(format!("lib{}.dylib", LIBRARY_NAME));
    } else if cfg!(target_os = "windows") {
        if cfg!(target_arch = "x86_64") {
            names.push(format!("{}_x64.dll", LIBRARY_NAME));
        } else if cfg!(target_arch = "x86") {
            names.push(format!("{}_x86.dll", LIBRARY_NAME));
        }
        names.push(format!("{}.dll", LIBRARY_NAME));
    } else {
        names.push(format!("lib{}.so", LIBRARY_NAME));
    }
    names
}

/// A loaded AEC3 library with its resolved entry points
pub struct NativeAec3Library {
    library: Arc<Library>,
    location: PathBuf,
    create: FnCreate,
    process_frame: FnProcessFrame,
    destroy: FnDestroy,
}

impl NativeAec3Library {
    /// Load from an explicit path, or search the platform names when `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::open(path.to_path_buf()),
            None => {
                let mut last_error = None;
                for name in candidate_library_names() {
                    match Self::open(PathBuf::from(&name)) {
                        Ok(library) => return Ok(library),
                        Err(e) => {
                            debug!("Could not load {}: {}", name, e);
                            last_error = Some(e);
                        }
                    }
                }
                Err(last_error.unwrap_or_else(|| {
                    AecError::Config("no candidate library names for this platform".to_string())
                }))
            }
        }
    }

    fn open(location: PathBuf) -> Result<Self> {
        // SAFETY: loading runs the library's initializers; the AEC3 library has no
        // initialization side effects beyond symbol registration.
        let library = unsafe { Library::new(&location)? };

        // SAFETY: the signatures match the library's C header. The copied function
        // pointers stay valid while `library` is alive, which every holder ensures
        // by keeping the Arc.
        let (create, process_frame, destroy) = unsafe {
            (
                *library.get::<FnCreate>(b"aec3_create\0")?,
                *library.get::<FnProcessFrame>(b"aec3_process_frame\0")?,
                *library.get::<FnDestroy>(b"aec3_destroy\0")?,
            )
        };

        info!("Loaded AEC3 library from {}", location.display());
        Ok(Self {
            library: Arc::new(library),
            location,
            create,
            process_frame,
            destroy,
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Create a canceller instance bound to `config`
    pub fn create_canceller(&self, config: &CancellerConfig) -> Result<NativeCanceller> {
        let native_config = Aec3Config {
            sample_rate: config.sample_rate as c_int,
            num_channels: config.channels as c_int,
            export_linear: config.export_linear as c_int,
        };

        // SAFETY: the config pointer is valid for the duration of the call.
        let raw = unsafe { (self.create)(&native_config) };
        let handle = NonNull::new(raw).ok_or_else(|| AecError::CreationFailure {
            sample_rate: config.sample_rate,
            channels: config.channels,
            reason: "aec3_create returned a null handle".to_string(),
        })?;

        info!(
            "AEC3 canceller created: {}Hz, {} channels, linear export {}",
            config.sample_rate, config.channels, config.export_linear
        );
        Ok(NativeCanceller {
            handle,
            config: *config,
            process_frame: self.process_frame,
            destroy: self.destroy,
            _library: Arc::clone(&self.library),
        })
    }
}

impl CancellerFactory for NativeAec3Library {
    fn create(&self, config: &CancellerConfig) -> Result<Box<dyn EchoCanceller>> {
        Ok(Box::new(self.create_canceller(config)?))
    }
}

impl std::fmt::Debug for NativeAec3Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeAec3Library")
            .field("location", &self.location)
            .finish()
    }
}

/// Owned AEC3 instance; the native handle is destroyed exactly once on drop
pub struct NativeCanceller {
    handle: NonNull<c_void>,
    config: CancellerConfig,
    process_frame: FnProcessFrame,
    destroy: FnDestroy,
    _library: Arc<Library>,
}

impl NativeCanceller {
    pub fn config(&self) -> &CancellerConfig {
        &self.config
    }

    fn validate_frame(
        &self,
        reference: &[i16],
        capture: &[i16],
        output: &[i16],
        linear_output: Option<&[i16]>,
    ) -> Result<usize> {
        let channels = self.config.channels as usize;
        let samples_per_channel = (self.config.sample_rate / FRAMES_PER_SECOND) as usize;
        let frame_len = samples_per_channel * channels;

        for (name, len) in [
            ("reference", reference.len()),
            ("capture", capture.len()),
            ("output", output.len()),
        ] {
            if len != frame_len {
                return Err(AecError::ShapeMismatch(format!(
                    "{} frame has {} samples, expected {}",
                    name, len, frame_len
                )));
            }
        }

        match (self.config.export_linear, linear_output) {
            (true, Some(linear)) if linear.len() != LINEAR_FRAME_SAMPLES * channels => {
                Err(AecError::ShapeMismatch(format!(
                    "linear frame has {} samples, expected {}",
                    linear.len(),
                    LINEAR_FRAME_SAMPLES * channels
                )))
            }
            (true, None) => Err(AecError::ShapeMismatch(
                "linear output buffer is required when linear export is enabled".to_string(),
            )),
            _ => Ok(samples_per_channel),
        }
    }
}

impl EchoCanceller for NativeCanceller {
    fn process_frame(
        &mut self,
        reference: &[i16],
        capture: &[i16],
        output: &mut [i16],
        linear_output: Option<&mut [i16]>,
        delay_samples: i32,
    ) -> Result<()> {
        let samples_per_channel =
            self.validate_frame(reference, capture, output, linear_output.as_deref())?;

        let linear_ptr = if self.config.export_linear {
            linear_output.map_or(std::ptr::null_mut(), |l| l.as_mut_ptr())
        } else {
            std::ptr::null_mut()
        };

        // SAFETY: all buffers were validated against the lengths the library reads
        // and writes, and the handle is live until drop.
        let status = unsafe {
            (self.process_frame)(
                self.handle.as_ptr(),
                reference.as_ptr(),
                capture.as_ptr(),
                output.as_mut_ptr(),
                linear_ptr,
                samples_per_channel,
                delay_samples as c_int,
            )
        };

        if status != 0 {
            warn!("aec3_process_frame returned status {}", status);
            return Err(AecError::FrameRejected { status });
        }
        Ok(())
    }
}

impl Drop for NativeCanceller {
    fn drop(&mut self) {
        // SAFETY: the handle came from aec3_create and is destroyed only here.
        unsafe { (self.destroy)(self.handle.as_ptr()) };
        debug!("AEC3 canceller destroyed");
    }
}

impl std::fmt::Debug for NativeCanceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCanceller")
            .field("config", &self.config)
            .finish()
    }
}
