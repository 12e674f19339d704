//! File-based storage backend implementation.
//!
//! Stores one JSON document per key under a configured directory, so the
//! depot's orders and audit trail survive restarts. Writes go through a
//! temp file and rename; mutations are serialized by a backend-wide
//! write lock, which also makes compare-and-swap atomic.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use depot_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// File-based storage implementation.
pub struct FileStorage {
	/// Directory holding one file per key.
	base_dir: PathBuf,
	/// Serializes mutations; reads go straight to the filesystem.
	write_lock: Mutex<()>,
}

impl FileStorage {
	/// Creates a file storage rooted at the given directory.
	///
	/// The directory is created if it does not exist.
	pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
		let base_dir = base_dir.into();
		std::fs::create_dir_all(&base_dir)
			.map_err(|e| StorageError::Backend(format!("Cannot create storage dir: {}", e)))?;
		Ok(Self {
			base_dir,
			write_lock: Mutex::new(()),
		})
	}

	fn path_for(&self, key: &str) -> PathBuf {
		self.base_dir.join(format!("{}.json", encode_key(key)))
	}

	async fn read_if_present(&self, path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		match fs::read(path).await {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn write_atomic(&self, path: &Path, value: &[u8]) -> Result<(), StorageError> {
		let tmp = path.with_extension("json.tmp");
		fs::write(&tmp, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&tmp, path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}
}

/// Encodes a storage key into a filesystem-safe file stem.
///
/// Alphanumerics, '.', '_' and '-' pass through; every other byte becomes
/// `%XX`. Decoding restores the original key, so listing can sort by the
/// real keys rather than their encoded forms.
fn encode_key(key: &str) -> String {
	let mut encoded = String::with_capacity(key.len());
	for byte in key.bytes() {
		match byte {
			b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
				encoded.push(byte as char)
			},
			other => {
				encoded.push('%');
				encoded.push_str(&format!("{:02X}", other));
			},
		}
	}
	encoded
}

/// Decodes a file stem produced by [`encode_key`].
fn decode_key(stem: &str) -> Result<String, StorageError> {
	let mut bytes = Vec::with_capacity(stem.len());
	let mut chars = stem.bytes();
	while let Some(byte) = chars.next() {
		if byte == b'%' {
			let hi = chars.next();
			let lo = chars.next();
			let (Some(hi), Some(lo)) = (hi, lo) else {
				return Err(StorageError::Backend(format!("Malformed key file: {}", stem)));
			};
			let hex = [hi, lo];
			let hex = std::str::from_utf8(&hex)
				.map_err(|_| StorageError::Backend(format!("Malformed key file: {}", stem)))?;
			let value = u8::from_str_radix(hex, 16)
				.map_err(|_| StorageError::Backend(format!("Malformed key file: {}", stem)))?;
			bytes.push(value);
		} else {
			bytes.push(byte);
		}
	}
	String::from_utf8(bytes).map_err(|e| StorageError::Backend(e.to_string()))
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.read_if_present(&self.path_for(key))
			.await?
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		self.write_atomic(&self.path_for(key), &value).await
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let _guard = self.write_lock.lock().await;
		let path = self.path_for(key);
		let current = self.read_if_present(&path).await?;
		if current.as_deref() != expected {
			return Ok(false);
		}
		self.write_atomic(&path, &value).await?;
		Ok(true)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		match fs::remove_file(self.path_for(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.path_for(key).exists())
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut entries = fs::read_dir(&self.base_dir)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let mut keys = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let name = entry.file_name();
			let Some(name) = name.to_str() else { continue };
			let Some(stem) = name.strip_suffix(".json") else {
				continue;
			};
			let key = decode_key(stem)?;
			if key.starts_with(prefix) {
				keys.push(key);
			}
		}
		keys.sort();
		Ok(keys)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("storage_path", FieldType::String)],
			vec![],
		);
		schema.validate(config)
	}
}

/// Registry entry for the file storage backend.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: directory to store data files in
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	let path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.ok_or_else(|| StorageError::Configuration("storage_path is required".into()))?;

	Ok(Box::new(FileStorage::new(path)?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn test_key_encoding_round_trip() {
		for key in ["orders:o-1", "audit_events:o-1:00000000000000000042", "plain"] {
			let encoded = encode_key(key);
			assert!(!encoded.contains(':'));
			assert_eq!(decode_key(&encoded).unwrap(), key);
		}
	}

	#[tokio::test]
	async fn test_basic_operations() {
		let dir = tempdir().unwrap();
		let storage = FileStorage::new(dir.path()).unwrap();

		storage
			.set_bytes("orders:o-1", b"{\"id\":\"o-1\"}".to_vec())
			.await
			.unwrap();
		assert!(storage.exists("orders:o-1").await.unwrap());
		assert_eq!(
			storage.get_bytes("orders:o-1").await.unwrap(),
			b"{\"id\":\"o-1\"}"
		);

		storage.delete("orders:o-1").await.unwrap();
		assert!(matches!(
			storage.get_bytes("orders:o-1").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_persists_across_reopen() {
		let dir = tempdir().unwrap();
		{
			let storage = FileStorage::new(dir.path()).unwrap();
			storage
				.set_bytes("orders:o-1", b"durable".to_vec())
				.await
				.unwrap();
		}

		let reopened = FileStorage::new(dir.path()).unwrap();
		assert_eq!(reopened.get_bytes("orders:o-1").await.unwrap(), b"durable");
	}

	#[tokio::test]
	async fn test_compare_and_swap() {
		let dir = tempdir().unwrap();
		let storage = FileStorage::new(dir.path()).unwrap();

		assert!(storage
			.compare_and_swap("k", None, b"v1".to_vec())
			.await
			.unwrap());
		assert!(!storage
			.compare_and_swap("k", Some(b"other"), b"v2".to_vec())
			.await
			.unwrap());
		assert!(storage
			.compare_and_swap("k", Some(b"v1"), b"v2".to_vec())
			.await
			.unwrap());
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"v2");
	}

	#[tokio::test]
	async fn test_list_keys_sorted() {
		let dir = tempdir().unwrap();
		let storage = FileStorage::new(dir.path()).unwrap();

		for key in ["orders:b", "orders:a", "audit_events:x"] {
			storage.set_bytes(key, b"{}".to_vec()).await.unwrap();
		}

		let keys = storage.list_keys("orders:").await.unwrap();
		assert_eq!(keys, vec!["orders:a", "orders:b"]);
	}

	#[test]
	fn test_factory_requires_storage_path() {
		let config: toml::Value = toml::from_str("").unwrap();
		assert!(matches!(
			create_storage(&config),
			Err(StorageError::Configuration(_))
		));
	}
}
