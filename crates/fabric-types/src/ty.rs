//! The primitive type lattice.
//!
//! [`Type`] is a set of primitive kinds. Static analysis only ever narrows a
//! set by intersection; the runtime reports the singleton kind of each value.
//! Member order is fixed by flag value and drives both diagnostic text and
//! the order in which dispatch branches are emitted.

use std::fmt;

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// A set of primitive kinds.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct Type: u8 {
        const BOOL = 1;
        const FLOAT = 1 << 1;
        const FRAME = 1 << 2;
        const INT = 1 << 3;
        const STR = 1 << 4;
        const TEMPLATE = 1 << 5;
        const UNIT = 1 << 6;
        const BIN = 1 << 7;
    }
}

impl Type {
    /// Every primitive kind.
    pub const ANY: Type = Type::all();
    /// The kinds arithmetic operates on.
    pub const NUMBER: Type = Type::INT.union(Type::FLOAT);

    /// True when exactly one kind is in the set.
    pub fn is_singleton(self) -> bool {
        self.bits().count_ones() == 1
    }

    /// Number of kinds in the set.
    pub fn len(self) -> usize {
        self.bits().count_ones() as usize
    }

    /// Enumerate the kinds in canonical order.
    pub fn members(self) -> impl Iterator<Item = Type> {
        self.iter()
    }

    /// Display name of a single kind.
    ///
    /// Returns `None` for the empty set and for unions.
    pub fn kind_name(self) -> Option<&'static str> {
        const NAMES: [(Type, &str); 8] = [
            (Type::BOOL, "Bool"),
            (Type::FLOAT, "Float"),
            (Type::FRAME, "Frame"),
            (Type::INT, "Int"),
            (Type::STR, "Str"),
            (Type::TEMPLATE, "Template"),
            (Type::UNIT, "Null"),
            (Type::BIN, "Bin"),
        ];
        NAMES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, name)| *name)
    }

    /// Merge rule for the primary branch of a null-coalescing expression.
    ///
    /// This is a deliberate exception to strict intersection. The primary
    /// branch of `a ?? b` is demanded as `original | Null`; if what it can
    /// actually produce shares nothing with `original` (for instance it can
    /// only be null), the mismatch is tolerated and `original` is reported,
    /// because the coalescing rewrite replaces the stray case at run time.
    /// Otherwise the primary branch's own set is kept, stray case included.
    pub fn coalescing_merge(expr_result: Type, original: Type) -> Type {
        if expr_result.is_empty() {
            return Type::empty();
        }
        if expr_result.intersects(original) {
            expr_result
        } else {
            original
        }
    }
}

/// Renders the members joined with `or`, e.g. `Int or Null`.
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "nothing");
        }
        for (index, member) in self.members().enumerate() {
            if index > 0 {
                write!(f, " or ")?;
            }
            write!(f, "{}", member.kind_name().unwrap_or("?"))?;
        }
        Ok(())
    }
}
