//! Simple file-backed [`TokenStore`] persisting a JSON snapshot after each mutation.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{SessionInfo, StoreError, StoreFuture, TokenStore},
	token::{TokenPair, TokenSecret},
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Snapshot {
	tokens: Option<TokenPair>,
	session: Option<SessionInfo>,
}

/// Persists the credential pair and session metadata to a JSON file after each mutation.
///
/// Writes go through a sibling `.tmp` file followed by an atomic rename, so a crash mid-write
/// never leaves a truncated snapshot behind.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = if path.exists() { Self::load_snapshot(&path)? } else { Snapshot::default() };

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(Snapshot::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}
		Ok(())
	}

	fn persist_locked(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl TokenStore for FileStore {
	fn save(&self, pair: TokenPair) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			guard.tokens = Some(pair);
			self.persist_locked(&guard)?;

			Ok(())
		})
	}

	fn access(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		Box::pin(async move {
			Ok(self.inner.read().tokens.as_ref().map(|pair| pair.access.clone()))
		})
	}

	fn refresh(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		Box::pin(async move {
			Ok(self.inner.read().tokens.as_ref().and_then(|pair| pair.refresh.clone()))
		})
	}

	fn save_session(&self, session: SessionInfo) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			guard.session = Some(session);
			self.persist_locked(&guard)?;

			Ok(())
		})
	}

	fn session(&self) -> StoreFuture<'_, Option<SessionInfo>> {
		Box::pin(async move { Ok(self.inner.read().session.clone()) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			*guard = Snapshot::default();
			self.persist_locked(&guard)?;

			Ok(())
		})
	}
}
