//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] for the relay minion. Configuration lives in
//! the `"minion"` namespace and the event log in `"events"`. Every value is
//! stored as a blob and committed immediately, so a power cut never leaves
//! a half-written key behind.
//!
//! On the host the partition is an in-memory map keyed by
//! `(namespace, key)`. The simulation can be switched to read-only to
//! exercise the paths that must survive a failing flash.

use crate::app::ports::{StorageError, StoragePort};
use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::cell::{Cell, RefCell};
#[cfg(not(target_os = "espidf"))]
use std::collections::BTreeMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// NVS limits namespace and key names to 15 characters.
const MAX_NAME_LEN: usize = 15;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: RefCell<BTreeMap<(String, String), Vec<u8>>>,
    #[cfg(not(target_os = "espidf"))]
    read_only: Cell<bool>,
}

impl NvsAdapter {
    /// Bring up the default NVS partition and hand out a handle to it.
    ///
    /// A partition with no free pages or written by a newer IDF is erased
    /// and initialised again. Every later call finds flash already up, so
    /// each subsystem can own its own adapter.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init is idempotent and called from task context.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: partition unusable ({}), erasing", ret);
                // SAFETY: no handle is open while the partition is erased.
                esp_result(unsafe { nvs_flash_erase() })?;
                esp_result(unsafe { nvs_flash_init() })?;
            } else {
                esp_result(ret)?;
            }
            info!("NvsAdapter: flash partition ready");
            Ok(Self {})
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("NvsAdapter: simulation backend");
            Ok(Self::simulated())
        }
    }

    /// Empty in-memory partition.
    #[cfg(not(target_os = "espidf"))]
    pub fn simulated() -> Self {
        Self {
            store: RefCell::new(BTreeMap::new()),
            read_only: Cell::new(false),
        }
    }

    /// Make every following write or delete fail with [`StorageError::IoError`].
    #[cfg(not(target_os = "espidf"))]
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.set(read_only);
    }

    /// Number of stored keys across all namespaces.
    #[cfg(not(target_os = "espidf"))]
    pub fn key_count(&self) -> usize {
        self.store.borrow().len()
    }

    #[cfg(not(target_os = "espidf"))]
    fn writable(&self) -> Result<(), StorageError> {
        if self.read_only.get() {
            return Err(StorageError::IoError);
        }
        Ok(())
    }
}

/// NUL-terminated copy of an NVS name.
fn c_name(name: &str) -> Result<[u8; MAX_NAME_LEN + 1], StorageError> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_NAME_LEN {
        return Err(StorageError::IoError);
    }
    let mut buf = [0u8; MAX_NAME_LEN + 1];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

#[cfg(target_os = "espidf")]
fn esp_result(ret: esp_err_t) -> Result<(), StorageError> {
    match ret {
        ESP_OK => Ok(()),
        ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
        ESP_ERR_NVS_NOT_ENOUGH_SPACE | ESP_ERR_NVS_NO_FREE_PAGES => Err(StorageError::Full),
        ESP_ERR_NVS_INVALID_LENGTH => Err(StorageError::Corrupted),
        _ => Err(StorageError::IoError),
    }
}

/// An open namespace, closed on drop.
#[cfg(target_os = "espidf")]
struct Handle(nvs_handle_t);

#[cfg(target_os = "espidf")]
impl Handle {
    fn open(namespace: &str, write: bool) -> Result<Self, StorageError> {
        let name = c_name(namespace)?;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let mut handle: nvs_handle_t = 0;
        // SAFETY: `name` is NUL-terminated and outlives the call.
        // A namespace that was never written reports NOT_FOUND here.
        esp_result(unsafe { nvs_open(name.as_ptr().cast(), mode, &mut handle) })?;
        Ok(Self(handle))
    }

    fn commit(&self) -> Result<(), StorageError> {
        // SAFETY: the handle is open for the lifetime of `self`.
        esp_result(unsafe { nvs_commit(self.0) })
    }
}

#[cfg(target_os = "espidf")]
impl Drop for Handle {
    fn drop(&mut self) {
        // SAFETY: opened in `Handle::open` and closed exactly once.
        unsafe { nvs_close(self.0) };
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            c_name(namespace)?;
            c_name(key)?;
            let store = self.store.borrow();
            let data = store
                .get(&(namespace.to_owned(), key.to_owned()))
                .ok_or(StorageError::NotFound)?;
            // Same contract as nvs_get_blob: the buffer must hold the whole value.
            let dest = buf.get_mut(..data.len()).ok_or(StorageError::Corrupted)?;
            dest.copy_from_slice(data);
            Ok(data.len())
        }

        #[cfg(target_os = "espidf")]
        {
            let handle = Handle::open(namespace, false)?;
            let key = c_name(key)?;
            let mut size = buf.len();
            // SAFETY: `buf` is valid for `size` bytes and NVS writes at most that many.
            esp_result(unsafe {
                nvs_get_blob(handle.0, key.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
            })?;
            Ok(size)
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            c_name(namespace)?;
            c_name(key)?;
            self.writable()?;
            self.store
                .borrow_mut()
                .insert((namespace.to_owned(), key.to_owned()), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let handle = Handle::open(namespace, true)?;
            let key = c_name(key)?;
            // SAFETY: `data` is valid for `data.len()` bytes.
            esp_result(unsafe {
                nvs_set_blob(handle.0, key.as_ptr().cast(), data.as_ptr().cast(), data.len())
            })?;
            handle.commit()
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            c_name(namespace)?;
            c_name(key)?;
            self.writable()?;
            self.store
                .borrow_mut()
                .remove(&(namespace.to_owned(), key.to_owned()));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let handle = match Handle::open(namespace, true) {
                Ok(handle) => handle,
                Err(StorageError::NotFound) => return Ok(()),
                Err(e) => return Err(e),
            };
            let key = c_name(key)?;
            // SAFETY: `key` is NUL-terminated.
            match esp_result(unsafe { nvs_erase_key(handle.0, key.as_ptr().cast()) }) {
                Ok(()) | Err(StorageError::NotFound) => handle.commit(),
                Err(e) => Err(e),
            }
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow()
                .contains_key(&(namespace.to_owned(), key.to_owned()))
        }

        #[cfg(target_os = "espidf")]
        {
            let Ok(handle) = Handle::open(namespace, false) else {
                return false;
            };
            let Ok(key) = c_name(key) else {
                return false;
            };
            // SAFETY: a null type pointer is accepted by nvs_find_key.
            let ret = unsafe { nvs_find_key(handle.0, key.as_ptr().cast(), core::ptr::null_mut()) };
            ret == ESP_OK
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write("minion", "safety_msg", b"Door open").unwrap();
        assert!(nvs.exists("minion", "safety_msg"));

        let mut buf = [0u8; 32];
        let len = nvs.read("minion", "safety_msg", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"Door open");

        nvs.delete("minion", "safety_msg").unwrap();
        assert!(!nvs.exists("minion", "safety_msg"));
    }

    #[test]
    fn missing_key_is_not_found() {
        let nvs = NvsAdapter::simulated();
        let mut buf = [0u8; 2];
        assert_eq!(nvs.read("minion", "address", &mut buf), Err(StorageError::NotFound));
    }

    #[test]
    fn value_larger_than_buffer_is_corrupted() {
        let mut nvs = NvsAdapter::simulated();
        nvs.write("minion", "serial", &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(nvs.read("minion", "serial", &mut buf), Err(StorageError::Corrupted));
    }

    #[test]
    fn overlong_names_are_rejected() {
        let mut nvs = NvsAdapter::simulated();
        assert_eq!(
            nvs.write("minion", "a_key_longer_than_nvs_allows", b"x"),
            Err(StorageError::IoError)
        );
        assert_eq!(nvs.key_count(), 0);
    }

    #[test]
    fn delete_missing_key_is_ok() {
        let mut nvs = NvsAdapter::simulated();
        assert!(nvs.delete("events", "e3").is_ok());
    }

    #[test]
    fn namespaces_do_not_collide() {
        let mut nvs = NvsAdapter::simulated();
        nvs.write("minion", "e0", b"alpha").unwrap();
        nvs.write("events", "e0", b"bravo").unwrap();

        let mut buf = [0u8; 8];
        let len = nvs.read("minion", "e0", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"alpha");
        let len = nvs.read("events", "e0", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"bravo");
    }

    #[test]
    fn read_only_partition_refuses_changes() {
        let mut nvs = NvsAdapter::simulated();
        nvs.write("minion", "fb_dir", &[1]).unwrap();
        nvs.set_read_only(true);

        assert_eq!(nvs.write("minion", "fb_dir", &[0]), Err(StorageError::IoError));
        assert_eq!(nvs.delete("minion", "fb_dir"), Err(StorageError::IoError));

        let mut buf = [0u8; 1];
        assert_eq!(nvs.read("minion", "fb_dir", &mut buf), Ok(1));
        assert_eq!(buf[0], 1);
    }
}
