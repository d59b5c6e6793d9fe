//! Name interning for identifiers and member names.
//!
//! The interner stores each unique string once and hands out a `NameId` for
//! efficient storage and comparison. Names are interned during parsing; during
//! elaboration lookups are needed only for scope maps, diagnostics, and
//! reflection output.

use ahash::AHashMap;

/// Index into the interner's storage.
///
/// Uses `u32` to save space in AST node payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameId(u32);

impl NameId {
    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The discard identifier `_`, pre-interned at a fixed slot.
pub(crate) const UNDERSCORE: NameId = NameId(0);

/// Owned storage of unique names plus the reverse lookup map.
#[derive(Debug)]
pub(crate) struct Interns {
    names: Vec<Box<str>>,
    lookup: AHashMap<Box<str>, NameId>,
}

impl Interns {
    pub fn new() -> Self {
        let mut interns = Self {
            names: Vec::new(),
            lookup: AHashMap::new(),
        };
        let underscore = interns.intern("_");
        debug_assert_eq!(underscore, UNDERSCORE);
        interns
    }

    /// Interns `name`, returning the existing id when it was seen before.
    pub fn intern(&mut self, name: &str) -> NameId {
        if let Some(&id) = self.lookup.get(name) {
            return id;
        }
        let id = NameId(u32::try_from(self.names.len()).expect("interner overflow"));
        let boxed: Box<str> = name.into();
        self.names.push(boxed.clone());
        self.lookup.insert(boxed, id);
        id
    }

    pub fn get(&self, id: NameId) -> &str {
        &self.names[id.index()]
    }

    /// Looks up a name without interning it.
    pub fn find(&self, name: &str) -> Option<NameId> {
        self.lookup.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedupes() {
        let mut interns = Interns::new();
        let a = interns.intern("items");
        let b = interns.intern("len");
        let c = interns.intern("items");
        assert_eq!(a, c, "same spelling must intern to the same id");
        assert_ne!(a, b);
        assert_eq!(interns.get(a), "items");
        assert_eq!(interns.get(b), "len");
    }

    #[test]
    fn underscore_is_preinterned() {
        let mut interns = Interns::new();
        assert_eq!(interns.intern("_"), UNDERSCORE);
    }
}
