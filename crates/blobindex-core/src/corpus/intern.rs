//! Short-string interning for corpus-resident metadata.
//!
//! MIME types and media tag names repeat across millions of rows; the
//! corpus keeps one canonical `Arc<str>` per distinct string.

use std::collections::HashSet;
use std::sync::Arc;

///
/// StrInterner
///

#[derive(Default)]
pub(crate) struct StrInterner {
    strings: HashSet<Arc<str>>,
}

impl StrInterner {
    pub fn intern(&mut self, s: &str) -> Arc<str> {
        if let Some(existing) = self.strings.get(s) {
            return Arc::clone(existing);
        }

        let arc: Arc<str> = Arc::from(s);
        self.strings.insert(Arc::clone(&arc));
        arc
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interns_to_one_allocation() {
        let mut interner = StrInterner::default();
        let a = interner.intern("text/html");
        let b = interner.intern("text/html");
        let c = interner.intern("image/png");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(interner.len(), 2);
    }
}
