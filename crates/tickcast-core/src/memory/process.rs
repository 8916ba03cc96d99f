//! Raw host-process memory access.
//!
//! The emulator's address space is opened once and read directly; everything
//! above this layer deals in guest addresses and never touches the process
//! handle itself.

use crate::error::Result;

/// Direct byte access to the emulator process at host addresses.
pub trait RawMemory {
    fn read_bytes(&self, host: u64, len: usize) -> Result<Vec<u8>>;
    fn write_bytes(&self, host: u64, bytes: &[u8]) -> Result<()>;
}

/// A discovered emulator process.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

#[cfg(unix)]
pub use unix::ProcessHandle;
#[cfg(windows)]
pub use win::ProcessHandle;

#[cfg(unix)]
mod unix {
    use std::fs::{self, File, OpenOptions};
    use std::os::unix::fs::FileExt;

    use tracing::{debug, info};

    use super::{ProcessInfo, RawMemory};
    use crate::error::{Error, Result};

    /// Open handle to the emulator's memory via `/proc/<pid>/mem`.
    pub struct ProcessHandle {
        pub info: ProcessInfo,
        mem: File,
        writable: bool,
    }

    impl ProcessHandle {
        /// Scan `/proc` for an emulator instance started with a QMP socket.
        pub fn find_emulator() -> Result<ProcessInfo> {
            for entry in fs::read_dir("/proc")? {
                let entry = entry?;
                let name = entry.file_name();
                let Some(pid) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
                    continue;
                };
                let Ok(cmdline) = fs::read(entry.path().join("cmdline")) else {
                    continue;
                };
                let cmdline = String::from_utf8_lossy(&cmdline).replace('\0', " ");
                if cmdline.contains("xemu") && cmdline.contains("-qmp") {
                    debug!("Found emulator candidate pid {}: {}", pid, cmdline.trim());
                    return Ok(ProcessInfo {
                        pid,
                        name: "xemu".to_string(),
                    });
                }
            }
            Err(Error::ProcessNotFound(
                "no xemu process with a QMP socket".to_string(),
            ))
        }

        pub fn open(info: ProcessInfo) -> Result<Self> {
            let path = format!("/proc/{}/mem", info.pid);
            let (mem, writable) = match OpenOptions::new().read(true).write(true).open(&path) {
                Ok(file) => (file, true),
                Err(_) => (
                    File::open(&path).map_err(|e| {
                        Error::ProcessOpenFailed(format!("{}: {}", path, e))
                    })?,
                    false,
                ),
            };
            info!(
                "Opened emulator process {} (pid {}, writable: {})",
                info.name, info.pid, writable
            );
            Ok(Self {
                info,
                mem,
                writable,
            })
        }

        pub fn find_and_open() -> Result<Self> {
            Self::open(Self::find_emulator()?)
        }
    }

    impl RawMemory for ProcessHandle {
        fn read_bytes(&self, host: u64, len: usize) -> Result<Vec<u8>> {
            let mut buf = vec![0u8; len];
            self.mem
                .read_exact_at(&mut buf, host)
                .map_err(|e| Error::MemoryFault {
                    address: host,
                    message: e.to_string(),
                })?;
            Ok(buf)
        }

        fn write_bytes(&self, host: u64, bytes: &[u8]) -> Result<()> {
            if !self.writable {
                return Err(Error::MemoryFault {
                    address: host,
                    message: "process memory opened read-only".to_string(),
                });
            }
            self.mem
                .write_all_at(bytes, host)
                .map_err(|e| Error::MemoryFault {
                    address: host,
                    message: e.to_string(),
                })
        }
    }
}

#[cfg(windows)]
mod win {
    use tracing::info;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
        TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Threading::{
        OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
        PROCESS_VM_WRITE,
    };

    use super::{ProcessInfo, RawMemory};
    use crate::error::{Error, Result};

    pub struct ProcessHandle {
        pub info: ProcessInfo,
        handle: HANDLE,
    }

    impl ProcessHandle {
        pub fn find_emulator() -> Result<ProcessInfo> {
            unsafe {
                let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
                    .map_err(|e| Error::ProcessNotFound(e.to_string()))?;
                let mut entry = PROCESSENTRY32W {
                    dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                    ..Default::default()
                };
                let mut found = None;
                if Process32FirstW(snapshot, &mut entry).is_ok() {
                    loop {
                        let name = String::from_utf16_lossy(
                            &entry.szExeFile[..entry
                                .szExeFile
                                .iter()
                                .position(|&c| c == 0)
                                .unwrap_or(entry.szExeFile.len())],
                        );
                        if name.eq_ignore_ascii_case("xemu.exe") {
                            found = Some(ProcessInfo {
                                pid: entry.th32ProcessID,
                                name,
                            });
                            break;
                        }
                        if Process32NextW(snapshot, &mut entry).is_err() {
                            break;
                        }
                    }
                }
                let _ = CloseHandle(snapshot);
                found.ok_or_else(|| Error::ProcessNotFound("no xemu.exe process".to_string()))
            }
        }

        pub fn open(info: ProcessInfo) -> Result<Self> {
            let handle = unsafe {
                OpenProcess(
                    PROCESS_QUERY_INFORMATION
                        | PROCESS_VM_READ
                        | PROCESS_VM_WRITE
                        | PROCESS_VM_OPERATION,
                    false,
                    info.pid,
                )
            }
            .map_err(|e| Error::ProcessOpenFailed(e.to_string()))?;
            info!("Opened emulator process {} (pid {})", info.name, info.pid);
            Ok(Self { info, handle })
        }

        pub fn find_and_open() -> Result<Self> {
            Self::open(Self::find_emulator()?)
        }
    }

    impl RawMemory for ProcessHandle {
        fn read_bytes(&self, host: u64, len: usize) -> Result<Vec<u8>> {
            let mut buf = vec![0u8; len];
            let mut read = 0usize;
            unsafe {
                ReadProcessMemory(
                    self.handle,
                    host as *const _,
                    buf.as_mut_ptr() as *mut _,
                    len,
                    Some(&mut read),
                )
            }
            .map_err(|e| Error::MemoryFault {
                address: host,
                message: e.to_string(),
            })?;
            if read != len {
                return Err(Error::MemoryFault {
                    address: host,
                    message: format!("short read: {} of {} bytes", read, len),
                });
            }
            Ok(buf)
        }

        fn write_bytes(&self, host: u64, bytes: &[u8]) -> Result<()> {
            unsafe {
                WriteProcessMemory(
                    self.handle,
                    host as *const _,
                    bytes.as_ptr() as *const _,
                    bytes.len(),
                    None,
                )
            }
            .map_err(|e| Error::MemoryFault {
                address: host,
                message: e.to_string(),
            })
        }
    }

    impl Drop for ProcessHandle {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }
}
