//! Grain key schemes and their classification.
//!
//! Every addressable interface is reached through one of five key shapes. An
//! interface advertises the shapes it supports through [`KeyMarker`]s; the
//! classifier picks one of them with a fixed precedence, because one interface
//! may carry several markers.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::descriptor::InterfaceDescriptor;

/// A key capability an interface declares.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyMarker {
    Guid,
    GuidCompound,
    Integer,
    IntegerCompound,
    String,
}

/// The addressing shape used to build a reference to a grain.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyScheme {
    Guid,
    String,
    Integer,
    GuidCompound,
    IntegerCompound,
}

impl KeyScheme {
    /// Precedence order. The first marker present wins; `String` is the fallback.
    const PRECEDENCE: [(KeyMarker, KeyScheme); 4] = [
        (KeyMarker::Guid, KeyScheme::Guid),
        (KeyMarker::GuidCompound, KeyScheme::GuidCompound),
        (KeyMarker::Integer, KeyScheme::Integer),
        (KeyMarker::IntegerCompound, KeyScheme::IntegerCompound),
    ];

    pub fn classify(markers: &[KeyMarker]) -> Self {
        Self::PRECEDENCE
            .iter()
            .find(|(marker, _)| markers.contains(marker))
            .map(|(_, scheme)| *scheme)
            .unwrap_or(KeyScheme::String)
    }

    pub fn is_compound(self) -> bool {
        matches!(self, Self::GuidCompound | Self::IntegerCompound)
    }
}

impl fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Guid            => "guid",
            Self::String          => "string",
            Self::Integer         => "integer",
            Self::GuidCompound    => "guid-compound",
            Self::IntegerCompound => "integer-compound",
        })
    }
}

/// A concrete grain key, shaped by a [`KeyScheme`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum GrainKey {
    Guid(Uuid),
    String(String),
    Integer(i64),
    GuidCompound(Uuid, String),
    IntegerCompound(i64, String),
}

impl GrainKey {
    pub fn scheme(&self) -> KeyScheme {
        match self {
            Self::Guid(_)               => KeyScheme::Guid,
            Self::String(_)             => KeyScheme::String,
            Self::Integer(_)            => KeyScheme::Integer,
            Self::GuidCompound(..)      => KeyScheme::GuidCompound,
            Self::IntegerCompound(..)   => KeyScheme::IntegerCompound,
        }
    }

    /// The extension half of a compound key.
    pub fn extension(&self) -> Option<&str> {
        match self {
            Self::GuidCompound(_, ext) | Self::IntegerCompound(_, ext) => Some(ext),
            _ => None,
        }
    }
}

impl fmt::Display for GrainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guid(id)                 => write!(f, "{id}"),
            Self::String(id)               => f.write_str(id),
            Self::Integer(id)              => write!(f, "{id}"),
            Self::GuidCompound(id, ext)    => write!(f, "{id}+{ext}"),
            Self::IntegerCompound(id, ext) => write!(f, "{id}+{ext}"),
        }
    }
}

/// Memoized interface → scheme classification.
///
/// Key capabilities never change at runtime, so the first classification of
/// an interface is kept for the life of the process. Concurrent first writes
/// compute the same value.
#[derive(Debug, Default)]
pub struct KeySchemeCache {
    schemes: DashMap<Arc<str>, KeyScheme>,
}

impl KeySchemeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, interface: &InterfaceDescriptor) -> KeyScheme {
        if let Some(scheme) = self.schemes.get(interface.name()) {
            return *scheme;
        }
        *self
            .schemes
            .entry(Arc::from(interface.name()))
            .or_insert_with(|| KeyScheme::classify(interface.key_markers()))
    }

    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_is_guid_first_string_last() {
        use KeyMarker::*;
        assert_eq!(KeyScheme::classify(&[Integer, Guid]), KeyScheme::Guid);
        assert_eq!(KeyScheme::classify(&[IntegerCompound, GuidCompound]), KeyScheme::GuidCompound);
        assert_eq!(KeyScheme::classify(&[IntegerCompound, Integer]), KeyScheme::Integer);
        assert_eq!(KeyScheme::classify(&[String, IntegerCompound]), KeyScheme::IntegerCompound);
        assert_eq!(KeyScheme::classify(&[String]), KeyScheme::String);
        assert_eq!(KeyScheme::classify(&[]), KeyScheme::String);
    }

    #[test]
    fn cache_memoizes_per_interface() {
        let cache = KeySchemeCache::new();
        let iface = InterfaceDescriptor::new("ICounter").key(KeyMarker::Integer);
        assert_eq!(cache.classify(&iface), KeyScheme::Integer);
        assert_eq!(cache.classify(&iface), KeyScheme::Integer);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_report_their_scheme_and_extension() {
        let key = GrainKey::IntegerCompound(7, "eu".to_owned());
        assert_eq!(key.scheme(), KeyScheme::IntegerCompound);
        assert_eq!(key.extension(), Some("eu"));
        assert_eq!(key.to_string(), "7+eu");
        assert_eq!(GrainKey::Integer(7).extension(), None);
    }
}
