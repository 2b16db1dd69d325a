//! Pre-interned names the algebra itself emits or inspects.
//!
//! Reductions produce calls to a small runtime surface (`get_enumerator`,
//! `move_next`, `dispose`, ...). Interning these once keeps the reduction
//! code free of string handling.

use crate::{Name, StringInterner};

/// Method and member names with fixed meaning in reduced trees.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KnownNames {
    pub get_enumerator: Name,
    pub move_next: Name,
    pub current: Name,
    pub dispose: Name,
    pub add: Name,
    pub to_str: Name,
    pub concat: Name,
    pub monitor_enter: Name,
    pub monitor_exit: Name,
    pub sort_by_keys: Name,
}

impl KnownNames {
    pub fn new(interner: &StringInterner) -> Self {
        KnownNames {
            get_enumerator: interner.intern("get_enumerator"),
            move_next: interner.intern("move_next"),
            current: interner.intern("current"),
            dispose: interner.intern("dispose"),
            add: interner.intern("add"),
            to_str: interner.intern("to_str"),
            concat: interner.intern("string.concat"),
            monitor_enter: interner.intern("monitor.enter"),
            monitor_exit: interner.intern("monitor.exit"),
            sort_by_keys: interner.intern("sort_by_keys"),
        }
    }
}
