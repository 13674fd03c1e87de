//! Objects related to [`FilesystemStore`] live here.
use crate::utils::check_namespace_key_validity;

use lightning_forwarder::util::persist::{is_valid_kvstore_str, KVStore};

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

// The number of read_dir errors in `list` we allow before we give up.
const LIST_DIR_CONSISTENCY_RETRIES: usize = 10;

struct FilesystemStoreInner {
	data_dir: PathBuf,
	tmp_file_counter: AtomicUsize,

	// Per path lock that ensures that we don't have concurrent writes to the same file. The lock
	// also encapsulates the latest written version per key.
	locks: Mutex<HashMap<PathBuf, Arc<RwLock<u64>>>>,
}

/// A [`KVStore`] implementation that writes to and reads from the file system.
///
/// Every key is stored as a file at `<data_dir>/<primary_namespace>/<secondary_namespace>/<key>`.
/// Writes go to a temporary file first which is then renamed over the destination, so readers
/// observe either the old or the new value and a crash never leaves a torn record behind.
pub struct FilesystemStore {
	inner: Arc<FilesystemStoreInner>,

	// Version counter to ensure that writes are applied in the correct order. It is assumed that
	// read and list operations aren't sensitive to the order of execution.
	next_version: AtomicU64,
}

impl FilesystemStore {
	/// Constructs a new [`FilesystemStore`].
	pub fn new(data_dir: PathBuf) -> Self {
		let locks = Mutex::new(HashMap::new());
		let tmp_file_counter = AtomicUsize::new(0);
		Self {
			inner: Arc::new(FilesystemStoreInner { data_dir, tmp_file_counter, locks }),
			next_version: AtomicU64::new(1),
		}
	}

	/// Returns the data directory.
	pub fn get_data_dir(&self) -> PathBuf {
		self.inner.data_dir.clone()
	}

	fn get_new_version_and_lock_ref(&self, dest_file_path: PathBuf) -> (Arc<RwLock<u64>>, u64) {
		let version = self.next_version.fetch_add(1, Ordering::Relaxed);
		if version == u64::MAX {
			panic!("FilesystemStore version counter overflowed");
		}

		// Get a reference to the inner lock. We do this early so that the arc can double as an
		// in-flight counter for cleaning up unused locks.
		let inner_lock_ref = self.inner.get_inner_lock_ref(dest_file_path);

		(inner_lock_ref, version)
	}

	#[cfg(test)]
	fn state_size(&self) -> usize {
		self.inner.locks.lock().unwrap().len()
	}
}

impl KVStore for FilesystemStore {
	fn read(&self, primary_namespace: &str, secondary_namespace: &str, key: &str) -> Result<Vec<u8>, std::io::Error> {
		let path = self.inner.get_checked_dest_file_path(primary_namespace, secondary_namespace, Some(key), "read")?;
		self.inner.read(path)
	}

	fn write(
		&self, primary_namespace: &str, secondary_namespace: &str, key: &str, buf: Vec<u8>,
	) -> Result<(), std::io::Error> {
		let path = self.inner.get_checked_dest_file_path(primary_namespace, secondary_namespace, Some(key), "write")?;
		let (inner_lock_ref, version) = self.get_new_version_and_lock_ref(path.clone());
		self.inner.write_version(inner_lock_ref, path, buf, version)
	}

	fn remove(
		&self, primary_namespace: &str, secondary_namespace: &str, key: &str, lazy: bool,
	) -> Result<(), std::io::Error> {
		let path = self.inner.get_checked_dest_file_path(primary_namespace, secondary_namespace, Some(key), "remove")?;
		let (inner_lock_ref, version) = self.get_new_version_and_lock_ref(path.clone());
		self.inner.remove_version(inner_lock_ref, path, lazy, version)
	}

	fn list(&self, primary_namespace: &str, secondary_namespace: &str) -> Result<Vec<String>, std::io::Error> {
		let path = self.inner.get_checked_dest_file_path(primary_namespace, secondary_namespace, None, "list")?;
		self.inner.list(path)
	}
}

impl FilesystemStoreInner {
	fn get_inner_lock_ref(&self, path: PathBuf) -> Arc<RwLock<u64>> {
		let mut outer_lock = self.locks.lock().unwrap();
		Arc::clone(&outer_lock.entry(path).or_default())
	}

	fn get_checked_dest_file_path(
		&self, primary_namespace: &str, secondary_namespace: &str, key: Option<&str>, operation: &str,
	) -> std::io::Result<PathBuf> {
		check_namespace_key_validity(primary_namespace, secondary_namespace, key, operation)?;

		let mut dest_file_path = self.data_dir.clone();
		dest_file_path.push(primary_namespace);
		if !secondary_namespace.is_empty() {
			dest_file_path.push(secondary_namespace);
		}
		if let Some(key) = key {
			dest_file_path.push(key);
		}

		Ok(dest_file_path)
	}

	fn read(&self, dest_file_path: PathBuf) -> std::io::Result<Vec<u8>> {
		let mut buf = Vec::new();

		self.execute_locked_read(dest_file_path.clone(), || {
			let mut f = fs::File::open(dest_file_path)?;
			f.read_to_end(&mut buf)?;
			Ok(())
		})?;

		Ok(buf)
	}

	fn execute_locked_write<F: FnOnce() -> Result<(), std::io::Error>>(
		&self, inner_lock_ref: Arc<RwLock<u64>>, dest_file_path: PathBuf, version: u64, callback: F,
	) -> Result<(), std::io::Error> {
		let res = {
			let mut last_written_version = inner_lock_ref.write().unwrap();

			// A writer that got its version later may have overtaken us, in which case our data is
			// already stale and must not be renamed over theirs.
			if version <= *last_written_version {
				Ok(())
			} else {
				callback().map(|_| {
					*last_written_version = version;
				})
			}
		};

		self.clean_locks(&inner_lock_ref, dest_file_path);

		res
	}

	fn execute_locked_read<F: FnOnce() -> Result<(), std::io::Error>>(
		&self, dest_file_path: PathBuf, callback: F,
	) -> Result<(), std::io::Error> {
		let inner_lock_ref = self.get_inner_lock_ref(dest_file_path.clone());
		let res = {
			let _guard = inner_lock_ref.read().unwrap();
			callback()
		};
		self.clean_locks(&inner_lock_ref, dest_file_path);
		res
	}

	fn clean_locks(&self, inner_lock_ref: &Arc<RwLock<u64>>, dest_file_path: PathBuf) {
		// Two arcs are expected when nothing else is in flight: the one in the map and the one we
		// hold. The outer lock is taken first so no new arc can be cloned after we've counted.
		let mut outer_lock = self.locks.lock().unwrap();

		let strong_count = Arc::strong_count(inner_lock_ref);
		debug_assert!(strong_count >= 2, "Unexpected FilesystemStore strong count");

		if strong_count == 2 {
			outer_lock.remove(&dest_file_path);
		}
	}

	fn write_version(
		&self, inner_lock_ref: Arc<RwLock<u64>>, dest_file_path: PathBuf, buf: Vec<u8>, version: u64,
	) -> std::io::Result<()> {
		let parent_directory = dest_file_path.parent().ok_or_else(|| {
			let msg = format!("Could not retrieve parent directory of {}.", dest_file_path.display());
			std::io::Error::new(std::io::ErrorKind::InvalidInput, msg)
		})?;
		fs::create_dir_all(parent_directory)?;

		// open(tmpname), write(tmpfile), fsync(tmpfile), close(tmpfile), rename(), fsync(dir)
		let mut tmp_file_path = dest_file_path.clone();
		let tmp_file_ext = format!("{}.tmp", self.tmp_file_counter.fetch_add(1, Ordering::AcqRel));
		tmp_file_path.set_extension(tmp_file_ext);

		{
			let mut tmp_file = fs::File::create(&tmp_file_path)?;
			tmp_file.write_all(&buf)?;
			tmp_file.sync_all()?;
		}

		let res = self.execute_locked_write(inner_lock_ref, dest_file_path.clone(), version, || {
			fs::rename(&tmp_file_path, &dest_file_path)?;
			let dir_file = fs::OpenOptions::new().read(true).open(parent_directory)?;
			dir_file.sync_all()?;
			Ok(())
		});

		// Stale versions and failed renames leave the temporary file behind.
		if tmp_file_path.exists() {
			fs::remove_file(&tmp_file_path).ok();
		}

		res
	}

	fn remove_version(
		&self, inner_lock_ref: Arc<RwLock<u64>>, dest_file_path: PathBuf, lazy: bool, version: u64,
	) -> std::io::Result<()> {
		self.execute_locked_write(inner_lock_ref, dest_file_path.clone(), version, || {
			if !dest_file_path.is_file() {
				return Ok(());
			}

			fs::remove_file(&dest_file_path)?;

			if !lazy {
				let parent_directory = dest_file_path.parent().ok_or_else(|| {
					let msg = format!("Could not retrieve parent directory of {}.", dest_file_path.display());
					std::io::Error::new(std::io::ErrorKind::InvalidInput, msg)
				})?;
				// `unlink` may only be cached until the parent directory is synced.
				let dir_file = fs::OpenOptions::new().read(true).open(parent_directory)?;
				dir_file.sync_all()?;
			}

			Ok(())
		})
	}

	fn list(&self, prefixed_dest: PathBuf) -> std::io::Result<Vec<String>> {
		if !Path::new(&prefixed_dest).exists() {
			return Ok(Vec::new());
		}

		let mut keys;
		let mut retries = LIST_DIR_CONSISTENCY_RETRIES;

		'retry_list: loop {
			keys = Vec::new();
			'skip_entry: for entry in fs::read_dir(&prefixed_dest)? {
				let entry = entry?;
				let p = entry.path();

				match dir_entry_is_key(&entry) {
					Ok(true) => {
						let key = get_key_from_dir_entry_path(&p, &prefixed_dest)?;
						keys.push(key);
					},
					Ok(false) => continue 'skip_entry,
					Err(e) => {
						if e.kind() == std::io::ErrorKind::NotFound && retries > 0 {
							// The entry vanished between `read_dir` and `metadata`, start over.
							retries -= 1;
							continue 'retry_list;
						} else {
							return Err(e);
						}
					},
				}
			}
			break 'retry_list;
		}

		Ok(keys)
	}
}

fn dir_entry_is_key(dir_entry: &fs::DirEntry) -> Result<bool, std::io::Error> {
	let p = dir_entry.path();
	if let Some(ext) = p.extension() {
		if ext == "tmp" {
			return Ok(false);
		}
	}

	let metadata = dir_entry.metadata()?;

	// Directories in the empty primary namespace are other namespaces, not keys.
	if metadata.is_dir() {
		return Ok(false);
	}

	if !metadata.is_file() {
		let msg = format!("Failed to list keys at path {}: file couldn't be accessed.", p.display());
		return Err(std::io::Error::new(std::io::ErrorKind::Other, msg));
	}

	Ok(true)
}

fn get_key_from_dir_entry_path(p: &Path, base_path: &Path) -> Result<String, std::io::Error> {
	let stripped_path = p.strip_prefix(base_path).map_err(|e| {
		let msg = format!("Failed to list keys of path {}: {}", p.display(), e);
		std::io::Error::new(std::io::ErrorKind::Other, msg)
	})?;
	match stripped_path.to_str() {
		Some(relative_path) if is_valid_kvstore_str(relative_path) => Ok(relative_path.to_string()),
		Some(_) => {
			let msg = format!("Failed to list keys of path {}: file path is not valid key", p.display());
			Err(std::io::Error::new(std::io::ErrorKind::Other, msg))
		},
		None => {
			let msg = format!("Failed to list keys of path {}: file path is not valid UTF-8", p.display());
			Err(std::io::Error::new(std::io::ErrorKind::Other, msg))
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::{do_read_write_remove_list_persist, do_test_forward_ledger_persistence};

	impl Drop for FilesystemStore {
		fn drop(&mut self) {
			// We test for invalid directory names, so it's OK if directory removal
			// fails.
			match fs::remove_dir_all(&self.inner.data_dir) {
				Err(e) => println!("Failed to remove test persister directory: {}", e),
				_ => {},
			}
		}
	}

	#[test]
	fn read_write_remove_list_persist() {
		let mut temp_path = std::env::temp_dir();
		temp_path.push("test_forwarder_read_write_remove_list_persist");
		let fs_store = FilesystemStore::new(temp_path);
		do_read_write_remove_list_persist(&fs_store);
		assert_eq!(fs_store.state_size(), 0);
	}

	#[test]
	fn overwrite_leaves_no_temporary_files() {
		let mut temp_path = std::env::temp_dir();
		temp_path.push("test_forwarder_overwrite_leaves_no_temporary_files");
		let fs_store = FilesystemStore::new(temp_path);

		fs_store.write("forwards", "", "1_0", vec![1; 8]).unwrap();
		fs_store.write("forwards", "", "1_0", vec![2; 8]).unwrap();
		assert_eq!(fs_store.read("forwards", "", "1_0").unwrap(), vec![2; 8]);

		let mut dir = fs_store.get_data_dir();
		dir.push("forwards");
		let entries: Vec<_> = fs::read_dir(&dir).unwrap().map(|e| e.unwrap().file_name()).collect();
		assert_eq!(entries, vec![std::ffi::OsString::from("1_0")]);
		assert_eq!(fs_store.list("forwards", "").unwrap(), vec!["1_0".to_string()]);
	}

	#[test]
	fn read_missing_key_is_not_found() {
		let mut temp_path = std::env::temp_dir();
		temp_path.push("test_forwarder_read_missing_key_is_not_found");
		let fs_store = FilesystemStore::new(temp_path);
		let err = fs_store.read("forwards", "", "1_0").unwrap_err();
		assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
		// Removing what isn't there succeeds.
		fs_store.remove("forwards", "", "1_0", false).unwrap();
		assert!(fs_store.list("forwards", "").unwrap().is_empty());
	}

	#[test]
	fn forward_ledger_persistence() {
		let mut temp_path = std::env::temp_dir();
		temp_path.push("test_forwarder_forward_ledger_persistence");
		let fs_store = FilesystemStore::new(temp_path);
		do_test_forward_ledger_persistence(&fs_store);
	}

	// Windows ignores the read-only flag for folders.
	#[cfg(not(target_os = "windows"))]
	#[test]
	fn readonly_dir_perm_failure() {
		let store = FilesystemStore::new("test_forwarder_readonly_dir_perm_failure".into());
		let mut namespace_dir = store.get_data_dir();
		namespace_dir.push("forwards");
		fs::create_dir_all(&namespace_dir).unwrap();

		let mut perms = fs::metadata(&namespace_dir).unwrap().permissions();
		perms.set_readonly(true);
		fs::set_permissions(&namespace_dir, perms).unwrap();

		// Root ignores directory permissions, in which case there is nothing to check.
		let canary = namespace_dir.join("canary");
		if fs::File::create(&canary).is_ok() {
			fs::remove_file(&canary).ok();
		} else {
			assert!(store.write("forwards", "", "1_0", vec![0; 8]).is_err());
			assert!(store.list("forwards", "").unwrap().is_empty());
		}

		let mut perms = fs::metadata(&namespace_dir).unwrap().permissions();
		perms.set_readonly(false);
		fs::set_permissions(&namespace_dir, perms).unwrap();
	}
}
