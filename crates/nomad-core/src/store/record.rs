use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::codec::MessageCodec;
use crate::collaborators::InFlightSet;
use crate::error::{Result, StoreError};
use crate::models::{DeliveryMethod, DeliveryState, MessageHash, SignatureStatus};
use crate::store::reconcile::reconcile;

/// Decoded fields of a message file, with its delivery state already reconciled.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedMessage {
    pub hash: MessageHash,
    pub timestamp: f64,
    pub title: String,
    pub content: String,
    pub state: DeliveryState,
    pub method: DeliveryMethod,
    pub transport_encryption: Option<String>,
    pub transport_encrypted: bool,
    pub signature: SignatureStatus,
    /// File modification time, for chronological ordering of the view
    pub sort_timestamp: Option<SystemTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Unloaded,
    Loaded(Box<LoadedMessage>),
    /// The file could not be read or decoded; holds the reason
    Invalid(String),
}

/// Lazily loaded handle over one message file in a conversation directory.
pub struct MessageRecord {
    path: PathBuf,
    state: LoadState,
    codec: Arc<dyn MessageCodec>,
    in_flight: Arc<dyn InFlightSet>,
}

impl MessageRecord {
    pub fn new(
        path: PathBuf,
        codec: Arc<dyn MessageCodec>,
        in_flight: Arc<dyn InFlightSet>,
    ) -> Self {
        Self {
            path,
            state: LoadState::Unloaded,
            codec,
            in_flight,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, LoadState::Loaded(_))
    }

    /// Read and decode the backing file, reconciling its delivery state.
    ///
    /// A failure leaves the record `Invalid` until it is unloaded again.
    pub fn load(&mut self) -> Result<()> {
        match self.read_and_decode() {
            Ok(loaded) => {
                self.state = LoadState::Loaded(Box::new(loaded));
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    "Error while loading message {} from disk: {}",
                    self.path.display(),
                    e
                );
                self.state = LoadState::Invalid(e.to_string());
                Err(e)
            }
        }
    }

    fn read_and_decode(&self) -> Result<LoadedMessage> {
        let bytes = std::fs::read(&self.path).map_err(|e| StoreError::fs(&self.path, e))?;
        let message = self
            .codec
            .decode(&bytes)
            .map_err(|e| StoreError::decode(&self.path, e))?;

        let sort_timestamp = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok();

        Ok(LoadedMessage {
            hash: message.hash,
            timestamp: message.timestamp,
            state: reconcile(message.state, &message.hash, self.in_flight.as_ref()),
            method: message.desired_method,
            signature: SignatureStatus::from_validation(
                message.signature_validated,
                message.unverified_reason,
            ),
            title: message.title,
            content: message.content,
            transport_encryption: message.transport_encryption,
            transport_encrypted: message.transport_encrypted,
            sort_timestamp,
        })
    }

    /// Loaded fields, loading on first access.
    pub fn loaded(&mut self) -> Result<&LoadedMessage> {
        if matches!(self.state, LoadState::Unloaded) {
            self.load()?;
        }

        match &self.state {
            LoadState::Loaded(message) => Ok(message.as_ref()),
            LoadState::Invalid(reason) => Err(StoreError::decode(&self.path, reason)),
            LoadState::Unloaded => Err(StoreError::decode(&self.path, "record not loaded")),
        }
    }

    pub fn state(&mut self) -> Result<DeliveryState> {
        Ok(self.loaded()?.state)
    }

    pub fn timestamp(&mut self) -> Result<f64> {
        Ok(self.loaded()?.timestamp)
    }

    pub fn title(&mut self) -> Result<&str> {
        Ok(&self.loaded()?.title)
    }

    pub fn content(&mut self) -> Result<&str> {
        Ok(&self.loaded()?.content)
    }

    pub fn hash(&mut self) -> Result<MessageHash> {
        Ok(self.loaded()?.hash)
    }

    pub fn method(&mut self) -> Result<DeliveryMethod> {
        Ok(self.loaded()?.method)
    }

    pub fn transport_encryption(&mut self) -> Result<Option<&str>> {
        Ok(self.loaded()?.transport_encryption.as_deref())
    }

    pub fn transport_encrypted(&mut self) -> Result<bool> {
        Ok(self.loaded()?.transport_encrypted)
    }

    pub fn signature_status(&mut self) -> Result<SignatureStatus> {
        Ok(self.loaded()?.signature)
    }

    pub fn sort_timestamp(&mut self) -> Result<Option<SystemTime>> {
        Ok(self.loaded()?.sort_timestamp)
    }

    /// Drop cached fields. The next access reads the file again.
    pub fn unload(&mut self) {
        self.state = LoadState::Unloaded;
    }

    /// Unload and delete the backing file. Succeeds if the file is already gone.
    pub fn purge(&mut self) -> Result<()> {
        self.unload();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::fs(&self.path, e)),
        }
    }
}

impl std::fmt::Debug for MessageRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRecord")
            .field("path", &self.path)
            .field("state", &self.state)
            .finish()
    }
}
