//! Local copies of trait data.
//!
//! Each trait instance a client subscribes to is backed by an
//! [`UpdatableSink`]: the property values last received from the publisher
//! (or written locally), the data version they correspond to, and the
//! bookkeeping for conditional updates.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::schema::{PropertyPathHandle, TraitDataHandle, TraitSchema};

/// Property values and versions of one trait instance
#[derive(Debug, Clone)]
pub struct UpdatableSink {
    schema: &'static TraitSchema,
    version: Option<u64>,
    update_required_version: Option<u64>,
    conditional: bool,
    properties: BTreeMap<PropertyPathHandle, Bytes>,
}

impl UpdatableSink {
    pub fn new(schema: &'static TraitSchema) -> Self {
        Self {
            schema,
            version: None,
            update_required_version: None,
            conditional: false,
            properties: BTreeMap::new(),
        }
    }

    /// Start with a known data version
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Start with a property value
    #[must_use]
    pub fn with_property(mut self, handle: PropertyPathHandle, value: Bytes) -> Self {
        self.properties.insert(handle, value);
        self
    }

    pub fn schema(&self) -> &'static TraitSchema {
        self.schema
    }

    /// Data version, `None` when invalid
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn set_version(&mut self, version: u64) {
        self.version = Some(version);
    }

    pub fn clear_version(&mut self) {
        self.version = None;
    }

    /// Version a pending conditional update is based on
    pub fn update_required_version(&self) -> Option<u64> {
        self.update_required_version
    }

    pub fn set_update_required_version(&mut self, version: Option<u64>) {
        self.update_required_version = version;
    }

    pub fn clear_update_required_version(&mut self) {
        self.update_required_version = None;
    }

    pub fn is_conditional(&self) -> bool {
        self.conditional
    }

    pub fn set_conditional(&mut self, conditional: bool) {
        self.conditional = conditional;
    }

    pub fn store(&mut self, handle: PropertyPathHandle, value: Bytes) {
        self.properties.insert(handle, value);
    }

    pub fn property(&self, handle: PropertyPathHandle) -> Option<&Bytes> {
        self.properties.get(&handle)
    }

    /// Serialized value of `handle`.
    ///
    /// A value stored directly at `handle` wins; otherwise the values of
    /// all stored descendants are concatenated in handle order.
    pub fn read(&self, handle: PropertyPathHandle) -> Bytes {
        if let Some(value) = self.properties.get(&handle) {
            return value.clone();
        }
        let mut out = BytesMut::new();
        for (property, value) in &self.properties {
            if self.schema.is_parent(*property, handle) {
                out.extend_from_slice(value);
            }
        }
        out.freeze()
    }
}

/// A trait instance registered with a client
#[derive(Debug, Clone)]
pub struct TraitInstance {
    pub handle: TraitDataHandle,
    pub sink: UpdatableSink,
    /// Has paths in the pending store not yet put into a request
    pub dirty: bool,
    /// A notification touched a path with local changes
    pub potential_data_loss: bool,
}

/// The trait instances a client subscribes to, in registration order
#[derive(Debug, Clone, Default)]
pub struct SinkCatalog {
    instances: Vec<TraitInstance>,
}

impl SinkCatalog {
    /// Register a sink. Fails if `handle` is already taken.
    pub fn add(&mut self, handle: TraitDataHandle, sink: UpdatableSink) -> Result<()> {
        if self.instances.iter().any(|i| i.handle == handle) {
            return Err(crate::error::ConfigError::new(format!(
                "trait data handle {} registered twice",
                handle.value()
            ))
            .into());
        }
        self.instances.push(TraitInstance {
            handle,
            sink,
            dirty: false,
            potential_data_loss: false,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TraitInstance> {
        self.instances.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut TraitInstance> {
        self.instances.get_mut(index)
    }

    pub fn locate(&self, handle: TraitDataHandle) -> Result<&TraitInstance> {
        self.instances
            .iter()
            .find(|i| i.handle == handle)
            .ok_or(Error::UnknownTrait(handle.value()))
    }

    pub fn locate_mut(&mut self, handle: TraitDataHandle) -> Result<&mut TraitInstance> {
        self.instances
            .iter_mut()
            .find(|i| i.handle == handle)
            .ok_or(Error::UnknownTrait(handle.value()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraitInstance> {
        self.instances.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TraitInstance> {
        self.instances.iter_mut()
    }
}
