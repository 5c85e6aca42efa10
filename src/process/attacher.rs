//! Opening sessions by process id, by adopted handle or by executable name

use super::enumeration::{negotiate, EnumerationLimits};
use super::handle::ScopedHandle;
use super::modules::MAX_PATH;
use super::session::Session;
use crate::config::Config;
use crate::core::types::{MemoryError, MemoryResult, ProcessId};
use crate::memory::pool;
use crate::pe::ExportLimits;
use crate::platform::Platform;
use crate::utils::string_conv::{extract_filename, wide_to_string};
use tracing::{debug, info};

/// Options carried by every session an attacher opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachOptions {
    /// Buffer seeds and retry bound for process and module enumeration
    pub enumeration: EnumerationLimits,
    /// Name and count bounds for export parsing
    pub exports: ExportLimits,
}

impl From<&Config> for AttachOptions {
    fn from(config: &Config) -> Self {
        AttachOptions {
            enumeration: config.enumeration,
            exports: config.exports,
        }
    }
}

/// Builds sessions against one platform
pub struct ProcessAttacher<P: Platform> {
    platform: P,
    options: AttachOptions,
}

impl<P: Platform> ProcessAttacher<P> {
    /// Create an attacher with default options
    pub fn new(platform: P) -> Self {
        ProcessAttacher {
            platform,
            options: AttachOptions::default(),
        }
    }

    /// Replace the options handed to the session
    pub fn with_options(mut self, options: AttachOptions) -> Self {
        self.options = options;
        self
    }

    /// Options sessions will be created with
    pub fn options(&self) -> &AttachOptions {
        &self.options
    }

    /// Open a session on `pid`
    pub fn attach(self, pid: ProcessId) -> MemoryResult<Session<P>> {
        let handle = ScopedHandle::open(&self.platform, pid)?.into_raw();
        info!("Attached to process {}", pid);
        Ok(Session::new(self.platform, pid, handle, self.options))
    }

    /// Take ownership of an already opened handle.
    ///
    /// The handle is closed if its process id cannot be queried.
    pub fn adopt(self, handle: P::Handle) -> MemoryResult<Session<P>> {
        let scoped = ScopedHandle::adopt(&self.platform, handle);
        let pid = self.platform.process_id(scoped.raw())?;
        let handle = scoped.into_raw();
        info!("Adopted handle for process {}", pid);
        Ok(Session::new(self.platform, pid, handle, self.options))
    }

    /// Open a session on the first process whose executable file name
    /// matches `name`, ignoring ASCII case.
    ///
    /// Every handle opened for a non-matching process is closed before
    /// this returns.
    pub fn attach_by_name(self, name: &str) -> MemoryResult<Session<P>> {
        if name.is_empty() {
            return Err(MemoryError::invalid_argument("empty process name"));
        }

        let limits = self.options.enumeration;
        let pids = negotiate(
            pool::shared::<u32>(),
            limits.process_seed,
            limits.max_attempts,
            |slots| self.platform.enum_processes(slots),
        )?;

        for &pid in pids.as_slice()? {
            let candidate = match ScopedHandle::open(&self.platform, pid) {
                Ok(candidate) => candidate,
                Err(err) => {
                    debug!("Skipping process {}: {}", pid, err);
                    continue;
                }
            };

            let mut image = [0u16; MAX_PATH];
            let len = match self.platform.process_image_name(candidate.raw(), &mut image) {
                Ok(len) => len.min(MAX_PATH),
                Err(err) => {
                    debug!("Skipping process {}: {}", pid, err);
                    continue;
                }
            };

            let path = wide_to_string(&image[..len]);
            if extract_filename(&path).eq_ignore_ascii_case(name) {
                let handle = candidate.into_raw();
                info!("Attached to process {} ({})", pid, path);
                return Ok(Session::new(self.platform, pid, handle, self.options));
            }
        }

        Err(MemoryError::ProcessNotFound(name.to_string()))
    }
}
