//! NVIDIA GPUs through the NVML library, loaded at runtime.
//!
//! The library is opened with `dlopen` so the binary runs (and prints curves) on machines
//! without the driver installed.

use crate::device::{DeviceError, DeviceResult, FanDevice};

use std::ffi::{CStr, c_char, c_uint, c_void};

use tracing::{debug, warn};

const LIBRARY: &CStr = c"libnvidia-ml.so.1";

type NvmlReturn = c_uint;
type RawDevice = *mut c_void;

const NVML_SUCCESS: NvmlReturn = 0;
const NVML_TEMPERATURE_GPU: c_uint = 0;
const NVML_FEATURE_ENABLED: c_uint = 1;

struct Library {
    init: unsafe extern "C" fn() -> NvmlReturn,
    shutdown: unsafe extern "C" fn() -> NvmlReturn,
    error_string: unsafe extern "C" fn(NvmlReturn) -> *const c_char,
    device_count: unsafe extern "C" fn(*mut c_uint) -> NvmlReturn,
    device_handle_by_index: unsafe extern "C" fn(c_uint, *mut RawDevice) -> NvmlReturn,
    device_temperature: unsafe extern "C" fn(RawDevice, c_uint, *mut c_uint) -> NvmlReturn,
    device_set_fan_speed: unsafe extern "C" fn(RawDevice, c_uint, c_uint) -> NvmlReturn,
    device_set_default_fan_speed: unsafe extern "C" fn(RawDevice, c_uint) -> NvmlReturn,
    device_fan_count: unsafe extern "C" fn(RawDevice, *mut c_uint) -> NvmlReturn,
    device_set_persistence_mode: unsafe extern "C" fn(RawDevice, c_uint) -> NvmlReturn,
}

fn dl_error() -> String {
    // SAFETY: dlerror returns null or a valid C string.
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        return "unknown error".to_string();
    }

    // SAFETY: checked non-null above.
    unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

/// Resolves `name` in `handle` as a function pointer of type `F`.
///
/// # Safety
/// `F` must be the function pointer type matching the symbol's C signature.
unsafe fn symbol<F: Copy>(handle: *mut c_void, name: &CStr) -> DeviceResult<F> {
    // SAFETY: `handle` comes from a successful dlopen.
    let address = unsafe { libc::dlsym(handle, name.as_ptr()) };
    if address.is_null() {
        return Err(DeviceError::Symbol(name.to_string_lossy().into_owned()));
    }

    // SAFETY: function pointers and data pointers have the same size on supported targets;
    // the caller guarantees the signature.
    Ok(unsafe { std::mem::transmute_copy::<*mut c_void, F>(&address) })
}

impl Library {
    /// # Safety
    /// `handle` must come from a successful dlopen of the NVML library.
    unsafe fn load(handle: *mut c_void) -> DeviceResult<Self> {
        // SAFETY: every type below matches the NVML header.
        unsafe {
            Ok(Self {
                init: symbol(handle, c"nvmlInit_v2")?,
                shutdown: symbol(handle, c"nvmlShutdown")?,
                error_string: symbol(handle, c"nvmlErrorString")?,
                device_count: symbol(handle, c"nvmlDeviceGetCount_v2")?,
                device_handle_by_index: symbol(handle, c"nvmlDeviceGetHandleByIndex_v2")?,
                device_temperature: symbol(handle, c"nvmlDeviceGetTemperature")?,
                device_set_fan_speed: symbol(handle, c"nvmlDeviceSetFanSpeed_v2")?,
                device_set_default_fan_speed: symbol(handle, c"nvmlDeviceSetDefaultFanSpeed_v2")?,
                device_fan_count: symbol(handle, c"nvmlDeviceGetNumFans")?,
                device_set_persistence_mode: symbol(handle, c"nvmlDeviceSetPersistenceMode")?,
            })
        }
    }

    fn check(&self, result: NvmlReturn, operation: &'static str) -> DeviceResult<()> {
        if result == NVML_SUCCESS {
            return Ok(());
        }

        // SAFETY: nvmlErrorString returns a static C string for any code.
        let message = unsafe { CStr::from_ptr((self.error_string)(result)) }
            .to_string_lossy()
            .into_owned();

        Err(DeviceError::Nvml { operation, message })
    }
}

/// Initialised NVML session. Shut down and unloaded on drop.
pub struct Nvml {
    handle: *mut c_void,
    library: Library,
}

// SAFETY: NVML is thread safe; the handle is only used to dlclose on drop.
unsafe impl Send for Nvml {}
unsafe impl Sync for Nvml {}

impl Nvml {
    /// Loads the library and initialises NVML.
    pub fn init() -> DeviceResult<Self> {
        // SAFETY: LIBRARY is a valid C string.
        let handle = unsafe { libc::dlopen(LIBRARY.as_ptr(), libc::RTLD_LAZY) };
        if handle.is_null() {
            return Err(DeviceError::Load(format!(
                "{}: {}",
                LIBRARY.to_string_lossy(),
                dl_error()
            )));
        }

        // SAFETY: the handle was just opened.
        let library = match unsafe { Library::load(handle) } {
            Ok(library) => library,
            Err(error) => {
                // SAFETY: nothing else uses the handle.
                unsafe { libc::dlclose(handle) };
                return Err(error);
            }
        };

        // SAFETY: loaded from the NVML library.
        let result = unsafe { (library.init)() };
        if let Err(error) = library.check(result, "init") {
            // SAFETY: NVML was not initialised, nothing else uses the handle.
            unsafe { libc::dlclose(handle) };
            return Err(error);
        }

        debug!("NVML initialised");
        Ok(Self { handle, library })
    }

    pub fn device_count(&self) -> DeviceResult<u32> {
        let mut count = 0;
        // SAFETY: valid out pointer, NVML initialised.
        let result = unsafe { (self.library.device_count)(&mut count) };
        self.library.check(result, "get_device_count")?;

        Ok(count)
    }

    /// Handle for the device at `index`.
    pub fn device(&self, index: u32) -> DeviceResult<NvmlGpu<'_>> {
        let mut device = std::ptr::null_mut();
        // SAFETY: valid out pointer, NVML initialised.
        let result = unsafe { (self.library.device_handle_by_index)(index, &mut device) };
        self.library.check(result, "get_device_handle_by_index")?;

        Ok(NvmlGpu {
            nvml: self,
            device,
        })
    }
}

impl Drop for Nvml {
    fn drop(&mut self) {
        // SAFETY: NVML was initialised by `init`.
        let result = unsafe { (self.library.shutdown)() };
        if let Err(error) = self.library.check(result, "shutdown") {
            warn!(%error, "NVML shutdown failed");
        }

        // SAFETY: no function pointer from the library is used after this.
        unsafe { libc::dlclose(self.handle) };
    }
}

/// One GPU, valid for the lifetime of its [`Nvml`] session.
pub struct NvmlGpu<'a> {
    nvml: &'a Nvml,
    device: RawDevice,
}

// SAFETY: NVML device handles may be used from any thread.
unsafe impl Send for NvmlGpu<'_> {}
unsafe impl Sync for NvmlGpu<'_> {}

impl NvmlGpu<'_> {
    /// Keeps the driver loaded while no client is attached.
    pub fn set_persistence_mode(&self) -> DeviceResult<()> {
        // SAFETY: valid device handle.
        let result = unsafe {
            (self.nvml.library.device_set_persistence_mode)(self.device, NVML_FEATURE_ENABLED)
        };
        self.nvml.library.check(result, "set_device_persistence_mode")
    }
}

impl FanDevice for NvmlGpu<'_> {
    fn temperature(&self) -> DeviceResult<u32> {
        let mut temperature = 0;
        // SAFETY: valid device handle and out pointer.
        let result = unsafe {
            (self.nvml.library.device_temperature)(
                self.device,
                NVML_TEMPERATURE_GPU,
                &mut temperature,
            )
        };
        self.nvml.library.check(result, "get_device_temperature")?;

        Ok(temperature)
    }

    fn fan_count(&self) -> DeviceResult<u32> {
        let mut count = 0;
        // SAFETY: valid device handle and out pointer.
        let result = unsafe { (self.nvml.library.device_fan_count)(self.device, &mut count) };
        self.nvml.library.check(result, "get_device_fan_count")?;

        Ok(count)
    }

    fn set_fan_speed(&self, fan: u32, percent: u32) -> DeviceResult<()> {
        // SAFETY: valid device handle.
        let result =
            unsafe { (self.nvml.library.device_set_fan_speed)(self.device, fan, percent) };
        self.nvml.library.check(result, "set_device_fan_speed")
    }

    fn set_default_fan_speed(&self, fan: u32) -> DeviceResult<()> {
        // SAFETY: valid device handle.
        let result =
            unsafe { (self.nvml.library.device_set_default_fan_speed)(self.device, fan) };
        self.nvml.library.check(result, "set_device_default_fan_speed")
    }
}
