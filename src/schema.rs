//! # Trait Schemas
//!
//! A WDM *trait* is a typed tree of properties. Every node in the tree is
//! addressed by a [`PropertyPathHandle`]; handle `1` is always the root and
//! handle `0` means "no property". A trait *instance* registered with a client
//! is addressed by a [`TraitDataHandle`], and the pair of both is a
//! [`TraitPath`].
//!
//! ```text
//!                       Root (1)
//!      ┌──────────┬────────┴───┬────────────┬─────────────────┐
//!  Current(2) Expiration(3) MinLog(4)  MaxLog(5)  TraitLoggingImportance(6) {dict}
//!                                                          │
//!                                                       Value(7)
//! ```
//!
//! [`TraitSchema`] stores the parent table of such a tree and answers the
//! structural questions the update engine asks: ancestry, dictionary-ness and
//! the tag path from the root.

use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Handle of a trait instance in a client's sink catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraitDataHandle(u16);

impl TraitDataHandle {
    pub const fn new(handle: u16) -> Self {
        Self(handle)
    }

    /// Get the raw value
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Handle of a property inside a trait schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyPathHandle(u32);

impl PropertyPathHandle {
    /// The "no property" handle
    pub const NULL: Self = Self(0);
    /// The root of every trait
    pub const ROOT: Self = Self(1);

    pub const fn new(handle: u32) -> Self {
        Self(handle)
    }

    /// Get the raw value
    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

/// A property of a specific trait instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraitPath {
    pub trait_handle: TraitDataHandle,
    pub property: PropertyPathHandle,
}

impl TraitPath {
    pub const fn new(trait_handle: TraitDataHandle, property: PropertyPathHandle) -> Self {
        Self {
            trait_handle,
            property,
        }
    }

    /// The root path of a trait instance
    pub const fn root(trait_handle: TraitDataHandle) -> Self {
        Self::new(trait_handle, PropertyPathHandle::ROOT)
    }
}

impl fmt::Display for TraitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}:p{}", self.trait_handle.0, self.property.0)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// One non-root node in a trait schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyInfo {
    /// Handle of the parent node
    pub parent: u32,
    /// Context tag of this node within its parent
    pub tag: u64,
    /// Whether this node is a dictionary (map) property
    pub dictionary: bool,
}

/// Static description of a trait's property tree.
///
/// `properties[i]` describes handle `i + 2`; the root has no entry.
#[derive(Debug, PartialEq, Eq)]
pub struct TraitSchema {
    pub name: &'static str,
    pub profile_id: u32,
    pub tree_depth: usize,
    pub properties: &'static [PropertyInfo],
}

impl TraitSchema {
    fn info(&self, handle: PropertyPathHandle) -> Option<&PropertyInfo> {
        let index = usize::try_from(handle.0.checked_sub(2)?).ok()?;
        self.properties.get(index)
    }

    /// Highest valid handle in this schema
    pub fn last_handle(&self) -> PropertyPathHandle {
        // properties.len() is tiny for any generated schema
        PropertyPathHandle(u32::try_from(self.properties.len()).unwrap_or(u32::MAX - 1) + 1)
    }

    pub fn is_valid(&self, handle: PropertyPathHandle) -> bool {
        handle.is_root() || self.info(handle).is_some()
    }

    /// Parent of `handle`; `None` for the root or an unknown handle.
    pub fn parent(&self, handle: PropertyPathHandle) -> Option<PropertyPathHandle> {
        self.info(handle).map(|info| PropertyPathHandle(info.parent))
    }

    /// True if `ancestor` is a strict ancestor of `child`.
    pub fn is_parent(&self, child: PropertyPathHandle, ancestor: PropertyPathHandle) -> bool {
        let mut current = child;
        while let Some(parent) = self.parent(current) {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    pub fn is_dictionary(&self, handle: PropertyPathHandle) -> bool {
        self.info(handle).is_some_and(|info| info.dictionary)
    }

    /// True if `handle` lives inside a dictionary element.
    pub fn is_in_dictionary(&self, handle: PropertyPathHandle) -> bool {
        let mut current = handle;
        while let Some(parent) = self.parent(current) {
            if self.is_dictionary(parent) {
                return true;
            }
            current = parent;
        }
        false
    }

    pub fn tag(&self, handle: PropertyPathHandle) -> Option<u64> {
        self.info(handle).map(|info| info.tag)
    }

    /// Context tags from the root down to `handle`, root excluded.
    pub fn relative_path_tags(&self, handle: PropertyPathHandle) -> Result<Vec<u64>> {
        if !self.is_valid(handle) {
            return Err(Error::SchemaMismatch);
        }
        let mut tags = Vec::with_capacity(self.tree_depth);
        let mut current = handle;
        while let Some(info) = self.info(current) {
            tags.push(info.tag);
            current = PropertyPathHandle(info.parent);
        }
        if tags.len() > self.tree_depth {
            return Err(Error::SchemaMismatch);
        }
        tags.reverse();
        Ok(tags)
    }
}

// ============================================================================
// GENERATED SCHEMAS
// ============================================================================

/// `weave.trait.log.LoggingSettingsTrait`
pub mod logging_settings {
    use super::{PropertyInfo, PropertyPathHandle, TraitSchema};

    pub const PROFILE_ID: u32 = 0x0000_0A01;

    pub const ROOT: PropertyPathHandle = PropertyPathHandle::ROOT;
    pub const CURRENT_IMPORTANCE: PropertyPathHandle = PropertyPathHandle::new(2);
    pub const IMPORTANCE_EXPIRATION: PropertyPathHandle = PropertyPathHandle::new(3);
    pub const MIN_LOG_TIME: PropertyPathHandle = PropertyPathHandle::new(4);
    pub const MAX_LOG_TIME: PropertyPathHandle = PropertyPathHandle::new(5);
    pub const TRAIT_LOGGING_IMPORTANCE: PropertyPathHandle = PropertyPathHandle::new(6);
    pub const TRAIT_LOGGING_IMPORTANCE_VALUE: PropertyPathHandle = PropertyPathHandle::new(7);
    pub const LAST_SCHEMA_HANDLE: PropertyPathHandle = TRAIT_LOGGING_IMPORTANCE_VALUE;

    pub static SCHEMA: TraitSchema = TraitSchema {
        name: "LoggingSettingsTrait",
        profile_id: PROFILE_ID,
        tree_depth: 2,
        properties: &[
            // current_importance
            PropertyInfo {
                parent: 1,
                tag: 1,
                dictionary: false,
            },
            // importance_expiration
            PropertyInfo {
                parent: 1,
                tag: 2,
                dictionary: false,
            },
            // min_log_time
            PropertyInfo {
                parent: 1,
                tag: 3,
                dictionary: false,
            },
            // max_log_time
            PropertyInfo {
                parent: 1,
                tag: 4,
                dictionary: false,
            },
            // trait_logging_importance
            PropertyInfo {
                parent: 1,
                tag: 5,
                dictionary: true,
            },
            // trait_logging_importance.value
            PropertyInfo {
                parent: 6,
                tag: 0,
                dictionary: false,
            },
        ],
    };
}

#[cfg(test)]
mod tests {
    use super::logging_settings::*;
    use super::*;

    #[test_log::test]
    fn parents_follow_the_tree() {
        assert_eq!(SCHEMA.parent(ROOT), None);
        assert_eq!(SCHEMA.parent(MIN_LOG_TIME), Some(ROOT));
        assert_eq!(
            SCHEMA.parent(TRAIT_LOGGING_IMPORTANCE_VALUE),
            Some(TRAIT_LOGGING_IMPORTANCE)
        );
        assert_eq!(SCHEMA.last_handle(), LAST_SCHEMA_HANDLE);
    }

    #[test_log::test]
    fn is_parent_is_strict_and_transitive() {
        assert!(SCHEMA.is_parent(TRAIT_LOGGING_IMPORTANCE_VALUE, ROOT));
        assert!(SCHEMA.is_parent(TRAIT_LOGGING_IMPORTANCE_VALUE, TRAIT_LOGGING_IMPORTANCE));
        assert!(!SCHEMA.is_parent(ROOT, ROOT));
        assert!(!SCHEMA.is_parent(MIN_LOG_TIME, MAX_LOG_TIME));
    }

    #[test_log::test]
    fn dictionary_flags() {
        assert!(SCHEMA.is_dictionary(TRAIT_LOGGING_IMPORTANCE));
        assert!(!SCHEMA.is_dictionary(TRAIT_LOGGING_IMPORTANCE_VALUE));
        assert!(SCHEMA.is_in_dictionary(TRAIT_LOGGING_IMPORTANCE_VALUE));
        assert!(!SCHEMA.is_in_dictionary(CURRENT_IMPORTANCE));
    }

    #[test_log::test]
    fn relative_path_tags_exclude_root() {
        assert_eq!(SCHEMA.relative_path_tags(ROOT), Ok(vec![]));
        assert_eq!(SCHEMA.relative_path_tags(MAX_LOG_TIME), Ok(vec![4]));
        assert_eq!(
            SCHEMA.relative_path_tags(TRAIT_LOGGING_IMPORTANCE_VALUE),
            Ok(vec![5, 0])
        );
        assert_eq!(
            SCHEMA.relative_path_tags(PropertyPathHandle::new(42)),
            Err(Error::SchemaMismatch)
        );
    }
}
