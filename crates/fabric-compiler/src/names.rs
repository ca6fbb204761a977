//! Classified names.
//!
//! Every name that a lookup can reach, including every intermediate component
//! of a dotted path, becomes one [`NameInfo`] in the [`ScopeTree`] arena. The
//! [`NameKind`] decides how type demands applied to the name are handled and
//! how its children are created.
//!
//! [`ScopeTree`]: crate::env::ScopeTree

use fabric_types::ast::NodeId;
use fabric_types::Type;
use indexmap::IndexMap;

use crate::env::EnvId;

/// Index of a [`NameInfo`] in the scope tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(pub(crate) u32);

impl NameId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a name is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameKind {
    /// Not defined locally; provided by the surrounding context at run time.
    Open { real_type: Type },
    /// The value being replaced by an amending override.
    Override { real_type: Type },
    /// Defined by an expression in the same environment.
    Bound { target: NodeId, restricted: Type },
    /// Inherited from the parent environment's name `source`.
    ///
    /// With `force_back`, demands go straight through to `source`. Without
    /// it, the demand narrows `mask` locally and is checked against the
    /// parent's proven value when code is generated.
    CopyFromParent {
        source: NameId,
        mask: Type,
        force_back: bool,
    },
    /// Result of an erroneous lookup. Absorbs every demand.
    Junk,
}

impl NameKind {
    /// Short tag used in debug events.
    pub fn label(&self) -> &'static str {
        match self {
            NameKind::Open { .. } => "open",
            NameKind::Override { .. } => "override",
            NameKind::Bound { .. } => "bound",
            NameKind::CopyFromParent {
                force_back: true, ..
            } => "copy-force-back",
            NameKind::CopyFromParent { .. } => "copy-masked",
            NameKind::Junk => "junk",
        }
    }
}

/// One classified name.
#[derive(Debug, Clone)]
pub struct NameInfo {
    /// Fully qualified dotted path.
    pub(crate) name: String,
    /// Owning environment. `None` for junk.
    pub(crate) env: Option<EnvId>,
    pub(crate) kind: NameKind,
    /// Set once any demand requires the value unboxed. Never cleared.
    pub(crate) must_unbox: bool,
    pub(crate) children: IndexMap<String, NameId>,
}

/// Outcome of applying a demand to a single name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Settled locally with the proven set.
    Resolved(Type),
    /// Apply the same demand to another name.
    Forward(NameId),
    /// Apply the same demand to a defining expression.
    Definition(NodeId),
}

impl NameInfo {
    pub(crate) fn new(name: impl Into<String>, env: Option<EnvId>, kind: NameKind) -> Self {
        Self {
            name: name.into(),
            env,
            kind,
            must_unbox: false,
            children: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> Option<EnvId> {
        self.env
    }

    pub fn kind(&self) -> &NameKind {
        &self.kind
    }

    pub fn must_unbox(&self) -> bool {
        self.must_unbox
    }

    /// Children created so far, in creation order.
    pub fn children(&self) -> impl Iterator<Item = (&str, NameId)> {
        self.children.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn is_junk(&self) -> bool {
        matches!(self.kind, NameKind::Junk)
    }

    /// Apply a demand without following delegation.
    ///
    /// On an empty intersection the known set is left as it was and the
    /// conflict is returned for reporting.
    pub(crate) fn ensure_local(
        &mut self,
        demanded: Type,
        must_unbox: bool,
    ) -> (Step, Option<Type>) {
        match &mut self.kind {
            NameKind::Open { real_type } | NameKind::Override { real_type } => {
                self.must_unbox |= must_unbox;
                narrow(real_type, demanded)
            }
            NameKind::CopyFromParent {
                mask,
                force_back: false,
                ..
            } => {
                self.must_unbox |= must_unbox;
                narrow(mask, demanded)
            }
            NameKind::CopyFromParent {
                source,
                force_back: true,
                ..
            } => {
                self.must_unbox |= must_unbox;
                (Step::Forward(*source), None)
            }
            NameKind::Bound { target, restricted } => {
                self.must_unbox |= must_unbox;
                let narrowed = *restricted & demanded;
                if !narrowed.is_empty() {
                    *restricted = narrowed;
                }
                (Step::Definition(*target), None)
            }
            NameKind::Junk => (Step::Resolved(Type::ANY), None),
        }
    }

    /// Fold the definition's proven set into a bound name.
    pub(crate) fn settle_bound(&mut self, proven: Type) {
        if let NameKind::Bound { restricted, .. } = &mut self.kind {
            let narrowed = *restricted & proven;
            if !narrowed.is_empty() {
                *restricted = narrowed;
            }
        }
    }
}

fn narrow(known: &mut Type, demanded: Type) -> (Step, Option<Type>) {
    if known.intersects(demanded) {
        *known &= demanded;
        (Step::Resolved(*known), None)
    } else {
        let conflict = *known;
        (Step::Resolved(conflict), Some(conflict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(name: &str) -> NameInfo {
        NameInfo::new(name, None, NameKind::Open { real_type: Type::ANY })
    }

    #[test]
    fn test_open_narrows_by_intersection() {
        let mut info = open("x");
        let (step, conflict) = info.ensure_local(Type::INT | Type::STR, false);
        assert_eq!(step, Step::Resolved(Type::INT | Type::STR));
        assert_eq!(conflict, None);
        let (step, _) = info.ensure_local(Type::INT | Type::FLOAT, true);
        assert_eq!(step, Step::Resolved(Type::INT));
        assert!(info.must_unbox());
    }

    #[test]
    fn test_open_conflict_keeps_known_set() {
        let mut info = open("x");
        info.ensure_local(Type::STR, false);
        let (step, conflict) = info.ensure_local(Type::INT, false);
        assert_eq!(conflict, Some(Type::STR));
        assert_eq!(step, Step::Resolved(Type::STR));
        assert_eq!(info.kind, NameKind::Open { real_type: Type::STR });
    }

    #[test]
    fn test_must_unbox_is_sticky() {
        let mut info = open("x");
        info.ensure_local(Type::ANY, true);
        info.ensure_local(Type::ANY, false);
        assert!(info.must_unbox());
    }

    #[test]
    fn test_bound_delegates() {
        let mut info = NameInfo::new(
            "x",
            None,
            NameKind::Bound {
                target: NodeId(4),
                restricted: Type::ANY,
            },
        );
        let (step, conflict) = info.ensure_local(Type::NUMBER, false);
        assert_eq!(step, Step::Definition(NodeId(4)));
        assert_eq!(conflict, None);
        info.settle_bound(Type::FLOAT);
        assert_eq!(
            info.kind,
            NameKind::Bound {
                target: NodeId(4),
                restricted: Type::FLOAT
            }
        );
    }

    #[test]
    fn test_force_back_forwards() {
        let mut info = NameInfo::new(
            "x",
            None,
            NameKind::CopyFromParent {
                source: NameId(9),
                mask: Type::ANY,
                force_back: true,
            },
        );
        let (step, _) = info.ensure_local(Type::BOOL, true);
        assert_eq!(step, Step::Forward(NameId(9)));
        assert!(info.must_unbox());
    }

    #[test]
    fn test_junk_absorbs() {
        let mut info = NameInfo::new("x", None, NameKind::Junk);
        let (step, conflict) = info.ensure_local(Type::empty(), true);
        assert_eq!(step, Step::Resolved(Type::ANY));
        assert_eq!(conflict, None);
        assert!(!info.must_unbox());
    }
}
