//! # String Identifiers
//!
//! A [`StringId`] is the 64-bit FNV-1a hash of a string's bytes. Engine code
//! compares, sorts and hashes identifiers as integers; the text is never
//! consulted again.
//!
//! ## Collisions
//!
//! Two different strings can map to the same id. Nothing resolves that. With
//! the `sid-registry` feature, [`sid`] remembers the first text seen for each
//! id and logs a warning when a different text arrives with the same id.
//! The registry lives on the host allocator, outside the engine heap, so ids
//! can be made before [`crate::memory::init`] and after shutdown.
//!
//! ## Compile-Time Ids
//!
//! ```rust
//! use oroboros_runtime::sid::{sid, sid_const, StringId};
//!
//! const PITCH: StringId = sid_const("cmd_camera_rotate_pitch");
//! assert_eq!(PITCH, sid("cmd_camera_rotate_pitch"));
//! ```

use std::fmt;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over `bytes`.
const fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// Hashed string identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StringId(u64);

impl StringId {
    /// Hashes `text` at compile time. Skips the registry.
    #[must_use]
    pub const fn from_static(text: &str) -> Self {
        Self(fnv1a(text.as_bytes()))
    }

    /// Wraps a raw hash, e.g. one read back from a save file.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw hash.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The text this id was first created from, if registered.
    #[must_use]
    pub fn text(self) -> Option<String> {
        lookup(self)
    }
}

/// Same as [`StringId::from_static`], usable in `const` items.
#[must_use]
pub const fn sid_const(text: &str) -> StringId {
    StringId::from_static(text)
}

/// Hashes `text` and records it for reverse lookup.
#[must_use]
pub fn sid(text: &str) -> StringId {
    let id = StringId::from_static(text);
    #[cfg(feature = "sid-registry")]
    registry::record(id, text);
    id
}

/// The text first registered for `id`.
///
/// Always empty without the `sid-registry` feature.
#[must_use]
pub fn lookup(id: StringId) -> Option<String> {
    #[cfg(feature = "sid-registry")]
    {
        registry::lookup(id)
    }
    #[cfg(not(feature = "sid-registry"))]
    {
        let _ = id;
        None
    }
}

#[cfg(feature = "sid-registry")]
mod registry {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::StringId;

    /// Reverse map. Entries are never removed.
    static TEXTS: Mutex<Option<HashMap<StringId, Box<str>>>> = parking_lot::const_mutex(None);

    pub(super) fn record(id: StringId, text: &str) {
        let mut texts = TEXTS.lock();
        let texts = texts.get_or_insert_with(HashMap::new);
        match texts.get(&id) {
            Some(known) if **known == *text => {}
            Some(known) => {
                tracing::warn!(id = id.0, known = &**known, text, "string id collision");
            }
            None => {
                texts.insert(id, text.into());
            }
        }
    }

    pub(super) fn lookup(id: StringId) -> Option<String> {
        TEXTS
            .lock()
            .as_ref()
            .and_then(|texts| texts.get(&id))
            .map(|text| text.to_string())
    }
}

impl fmt::Display for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match lookup(*self) {
            Some(text) => f.write_str(&text),
            None => write!(f, "#{:016x}", self.0),
        }
    }
}

impl fmt::Debug for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match lookup(*self) {
            Some(text) => write!(f, "StringId({:#018x}, {text:?})", self.0),
            None => write!(f, "StringId({:#018x})", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(StringId::from_static("").as_u64(), 0xcbf2_9ce4_8422_2325);
        assert_eq!(StringId::from_static("a").as_u64(), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(StringId::from_static("foobar").as_u64(), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn test_deterministic() {
        const PITCH: StringId = sid_const("cmd_camera_rotate_pitch");
        for _ in 0..3 {
            assert_eq!(sid("cmd_camera_rotate_pitch"), PITCH);
        }
        assert_ne!(sid("cmd_camera_rotate_pitch"), sid("cmd_camera_rotate_yaw"));
    }

    #[test]
    fn test_ordering_is_by_integer() {
        let a = StringId::from_raw(1);
        let b = StringId::from_raw(2);
        assert!(a < b);
        assert_eq!(StringId::from_raw(sid("zeta").as_u64()), sid("zeta"));
    }

    #[cfg(feature = "sid-registry")]
    #[test]
    fn test_registry_reverse_lookup() {
        let id = sid("entity_player_spawn");
        assert_eq!(lookup(id).as_deref(), Some("entity_player_spawn"));
        assert_eq!(id.to_string(), "entity_player_spawn");
        assert!(format!("{id:?}").contains("entity_player_spawn"));

        let unregistered = StringId::from_static("never_passed_to_sid_0451");
        assert_eq!(lookup(unregistered), None);
        assert_eq!(unregistered.to_string(), format!("#{:016x}", unregistered.as_u64()));
    }

    #[cfg(feature = "sid-registry")]
    #[test]
    fn test_registry_keeps_first_text_on_collision() {
        let id = StringId::from_raw(0x5eed_0000_0000_0001);
        registry::record(id, "first");
        registry::record(id, "second");
        assert_eq!(lookup(id).as_deref(), Some("first"));
        assert_eq!(id.to_string(), "first");

        // Same text again is a no-op.
        registry::record(id, "first");
        assert_eq!(lookup(id).as_deref(), Some("first"));
    }

    #[test]
    fn test_no_collisions_in_engine_sized_vocabulary() {
        const SUBSYSTEMS: [&str; 10] = [
            "cmd", "entity", "mesh", "shader", "texture", "audio", "input", "ui", "net", "physics",
        ];
        const VERBS: [&str; 10] = [
            "create", "destroy", "update", "rotate", "scale", "load", "unload", "bind", "play",
            "stop",
        ];

        let ids: HashSet<u64> = (0..500)
            .flat_map(|n| {
                SUBSYSTEMS.iter().flat_map(move |subsystem| {
                    VERBS.iter().map(move |verb| {
                        StringId::from_static(&format!("{subsystem}_{verb}_{n}")).as_u64()
                    })
                })
            })
            .collect();
        assert_eq!(ids.len(), 50_000);
    }
}
