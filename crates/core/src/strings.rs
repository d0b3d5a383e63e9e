//! String interning
//!
//! Every string a program ever sees is canonicalized here, so textual
//! equality reduces to handle identity everywhere else. The set holds one
//! strong reference per distinct string; dropping it releases the whole
//! string heap in one pass.

use crate::object::{ObjString, hash_bytes};
use crate::table::Table;
use crate::value::Value;
use std::rc::Rc;

/// The intern set. A [`Table`] used purely as a set: values are always
/// `Nil`, and nothing is ever deleted.
pub struct Strings {
    table: Table,
}

impl Strings {
    pub fn new() -> Strings {
        Strings { table: Table::new() }
    }

    /// Copy-intern: borrow the bytes, return the canonical handle. Only a
    /// miss copies `text` into a fresh allocation.
    pub fn intern(&mut self, text: &str) -> Rc<ObjString> {
        let hash = hash_bytes(text.as_bytes());
        if let Some(existing) = self.table.find_string(text, hash) {
            return existing;
        }
        self.insert(text.to_string(), hash)
    }

    /// Take-intern: the caller already owns the buffer. On a hit the buffer
    /// is dropped and the existing handle returned; on a miss the buffer is
    /// adopted as-is.
    pub fn intern_owned(&mut self, text: String) -> Rc<ObjString> {
        let hash = hash_bytes(text.as_bytes());
        if let Some(existing) = self.table.find_string(&text, hash) {
            return existing;
        }
        self.insert(text, hash)
    }

    fn insert(&mut self, text: String, hash: u32) -> Rc<ObjString> {
        let string = ObjString::with_hash(text, hash);
        self.table.set(Rc::clone(&string), Value::Nil);
        string
    }
}

impl Default for Strings {
    fn default() -> Strings {
        Strings::new()
    }
}
