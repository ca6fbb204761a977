//! Environments and the name arena.
//!
//! An [`Environment`] is a scope created by a frame, template, `Let`, or
//! other binding construct. Environments form a tree rooted at the file
//! scope. Each one maps local names to [`NameInfo`]s, or marks them
//! forbidden.
//!
//! [`ScopeTree`] owns both arenas and implements name resolution. Demands on
//! bound names are passed back to the caller through [`Typeable`], since only
//! the caller knows the defining expressions.

use std::collections::HashMap;

use fabric_types::ast::NodeId;
use fabric_types::{ErrorCode, Span, Type};
use indexmap::IndexMap;

use crate::diagnostics::Diagnostics;
use crate::names::{NameId, NameInfo, NameKind, Step};

// ══════════════════════════════════════════════════════════════════════════════
// Environment
// ══════════════════════════════════════════════════════════════════════════════

/// Index of an [`Environment`] in the scope tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvId(pub(crate) u32);

impl EnvId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Type and unboxing requirement recorded for an intrinsic call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intrinsic {
    pub ty: Type,
    pub must_unbox: bool,
}

/// A lexical scope.
#[derive(Debug, Clone)]
pub struct Environment {
    parent: Option<EnvId>,
    children: Vec<EnvId>,
    priority: u32,
    force_back: bool,
    top_level: bool,
    span: Span,
    /// `None` marks a forbidden name.
    names: IndexMap<String, Option<NameId>>,
    intrinsics: HashMap<NodeId, Intrinsic>,
}

impl Environment {
    pub fn parent(&self) -> Option<EnvId> {
        self.parent
    }

    pub fn children(&self) -> &[EnvId] {
        &self.children
    }

    /// Demand ordering key. Larger values are further from the root.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Whether lookups first resolve in the parent before being inherited.
    pub fn force_back(&self) -> bool {
        self.force_back
    }

    /// Inherited from the root.
    pub fn top_level(&self) -> bool {
        self.top_level
    }

    pub fn span(&self) -> Span {
        self.span
    }

    /// Local entries in insertion order. `None` marks a forbidden name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<NameId>)> {
        self.names.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// The local entry for `name`, if it is bound and not forbidden.
    pub fn local(&self, name: &str) -> Option<NameId> {
        self.names.get(name).copied().flatten()
    }

    pub fn is_forbidden(&self, name: &str) -> bool {
        matches!(self.names.get(name), Some(None))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Typeable
// ══════════════════════════════════════════════════════════════════════════════

/// Something that can prove the type of a defining expression.
///
/// Bound names hand their demands to the expression they are bound to.
pub trait Typeable {
    /// Narrow `node` to `demanded` and return what it can still produce.
    fn ensure_type(
        &mut self,
        tree: &mut ScopeTree,
        diag: &mut Diagnostics,
        node: NodeId,
        demanded: Type,
        must_unbox: bool,
    ) -> Type;
}

// ══════════════════════════════════════════════════════════════════════════════
// ScopeTree
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Name(NameId),
    Forbidden,
    Absent,
}

/// Arena of environments and the names classified in them.
#[derive(Debug, Clone, Default)]
pub struct ScopeTree {
    envs: Vec<Environment>,
    names: Vec<NameInfo>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn env(&self, id: EnvId) -> &Environment {
        &self.envs[id.index()]
    }

    pub fn name(&self, id: NameId) -> &NameInfo {
        &self.names[id.index()]
    }

    /// Every classified name, in creation order.
    pub fn names(&self) -> impl Iterator<Item = (NameId, &NameInfo)> {
        self.names
            .iter()
            .enumerate()
            .map(|(index, info)| (NameId(index as u32), info))
    }

    pub fn env_count(&self) -> usize {
        self.envs.len()
    }

    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// Create a root environment. Roots have priority 2.
    pub fn new_root(&mut self, span: Span, top_level: bool) -> EnvId {
        self.push_env(Environment {
            parent: None,
            children: Vec::new(),
            priority: 2,
            force_back: false,
            top_level,
            span,
            names: IndexMap::new(),
            intrinsics: HashMap::new(),
        })
    }

    /// Create a child environment.
    ///
    /// A force-back child's priority is its parent's plus one, any other
    /// child's is its parent's plus two. Demands run in ascending priority,
    /// so a force-back child's demands run after its parent's and before
    /// those of any ordinary sibling.
    pub fn new_child(&mut self, parent: EnvId, span: Span, force_back: bool) -> EnvId {
        let outer = self.env(parent);
        let priority = outer.priority + if force_back { 1 } else { 2 };
        let top_level = outer.top_level;
        let id = self.push_env(Environment {
            parent: Some(parent),
            children: Vec::new(),
            priority,
            force_back,
            top_level,
            span,
            names: IndexMap::new(),
            intrinsics: HashMap::new(),
        });
        self.envs[parent.index()].children.push(id);
        id
    }

    fn push_env(&mut self, env: Environment) -> EnvId {
        let id = EnvId(self.envs.len() as u32);
        self.envs.push(env);
        id
    }

    fn push_name(&mut self, info: NameInfo) -> NameId {
        let id = NameId(self.names.len() as u32);
        tracing::trace!(name = %info.name, kind = info.kind.label(), "classified name");
        self.names.push(info);
        id
    }

    /// A fresh junk name.
    pub fn junk(&mut self) -> NameId {
        self.push_name(NameInfo::new("<junk>", None, NameKind::Junk))
    }

    pub fn is_junk(&self, id: NameId) -> bool {
        self.name(id).is_junk()
    }

    // ── Declarations ──

    /// Bind `name` to the expression `target`.
    ///
    /// Returns `None`, leaving the first binding in place, when `name` already
    /// has a local entry.
    pub fn add_bound(&mut self, env: EnvId, name: &str, target: NodeId) -> Option<NameId> {
        if self.env(env).names.contains_key(name) {
            return None;
        }
        let id = self.push_name(NameInfo::new(
            name,
            Some(env),
            NameKind::Bound {
                target,
                restricted: Type::ANY,
            },
        ));
        self.envs[env.index()].names.insert(name.to_string(), Some(id));
        Some(id)
    }

    /// Register the alias for the value an amending override replaces.
    pub fn add_override_name(&mut self, env: EnvId, name: &str) -> NameId {
        let id = self.push_name(NameInfo::new(
            name,
            Some(env),
            NameKind::Override {
                real_type: Type::ANY,
            },
        ));
        self.envs[env.index()].names.insert(name.to_string(), Some(id));
        id
    }

    /// Make `name` inaccessible from `env` and its descendants.
    pub fn add_forbidden(&mut self, env: EnvId, name: &str) {
        self.envs[env.index()].names.insert(name.to_string(), None);
    }

    // ── Resolution ──

    /// True if `name` has an entry, forbidden or not, in `env` or an ancestor.
    pub fn has_name(&self, env: EnvId, name: &str) -> bool {
        let mut current = Some(env);
        while let Some(id) = current {
            let scope = self.env(id);
            if scope.names.contains_key(name) {
                return true;
            }
            current = scope.parent;
        }
        false
    }

    /// Resolve a dotted path in `env`, classifying every name on the way.
    ///
    /// Errors are reported to `diag`; the result is then a junk name.
    pub fn lookup(
        &mut self,
        env: EnvId,
        names: &[String],
        span: Span,
        diag: &mut Diagnostics,
        defs: &mut dyn Typeable,
    ) -> NameId {
        let Some((first, rest)) = names.split_first() else {
            diag.error(
                ErrorCode::EMPTY_LOOKUP,
                "Lookup must name at least one attribute.",
                span,
            );
            return self.junk();
        };

        match self.env(env).names.get(first).copied() {
            Some(Some(id)) => return self.name_lookup(id, rest, diag, defs),
            Some(None) => {
                diag.forbidden_name(span, first);
                return self.junk();
            }
            None => {}
        }

        let (parent, force_back) = {
            let scope = self.env(env);
            (scope.parent, scope.force_back)
        };
        if let (Some(parent), true) = (parent, force_back) {
            let inherited = self.lookup(parent, names, span, diag, defs);
            if self.is_junk(inherited) {
                // Already reported by the parent.
                return self.junk();
            }
        }

        match self.lookback(env, first) {
            Binding::Name(id) => return self.name_lookup(id, rest, diag, defs),
            Binding::Forbidden => {
                diag.forbidden_name(span, first);
                return self.junk();
            }
            Binding::Absent => {}
        }

        let id = self.push_name(NameInfo::new(
            first.as_str(),
            Some(env),
            NameKind::Open {
                real_type: Type::ANY,
            },
        ));
        self.envs[env.index()].names.insert(first.clone(), Some(id));
        self.name_lookup(id, rest, diag, defs)
    }

    /// Find `name` in `env` or an ancestor, inserting inherited copies into
    /// every environment along the way.
    fn lookback(&mut self, env: EnvId, name: &str) -> Binding {
        match self.env(env).names.get(name) {
            Some(Some(id)) => return Binding::Name(*id),
            Some(None) => return Binding::Forbidden,
            None => {}
        }
        let Some(parent) = self.env(env).parent else {
            return Binding::Absent;
        };
        match self.lookback(parent, name) {
            Binding::Name(original) => {
                let force_back = self.env(env).force_back;
                let copy = self.push_name(NameInfo::new(
                    name,
                    Some(env),
                    NameKind::CopyFromParent {
                        source: original,
                        mask: Type::ANY,
                        force_back,
                    },
                ));
                self.envs[env.index()]
                    .names
                    .insert(name.to_string(), Some(copy));
                Binding::Name(copy)
            }
            other => other,
        }
    }

    /// Drill from `start` through `rest`; every name passed through must be
    /// a frame.
    pub fn name_lookup(
        &mut self,
        start: NameId,
        rest: &[String],
        diag: &mut Diagnostics,
        defs: &mut dyn Typeable,
    ) -> NameId {
        let mut current = start;
        for component in rest {
            self.ensure(current, Type::FRAME, false, diag, defs);
            current = self.child_of(current, component, diag, defs);
        }
        current
    }

    fn child_of(
        &mut self,
        id: NameId,
        name: &str,
        diag: &mut Diagnostics,
        defs: &mut dyn Typeable,
    ) -> NameId {
        if let Some(child) = self.name(id).children.get(name) {
            return *child;
        }
        self.create_child(id, name, diag, defs)
    }

    fn create_child(
        &mut self,
        id: NameId,
        name: &str,
        diag: &mut Diagnostics,
        defs: &mut dyn Typeable,
    ) -> NameId {
        let (full, env, kind) = {
            let info = self.name(id);
            (format!("{}.{}", info.name, name), info.env, info.kind.clone())
        };
        let kind = match kind {
            NameKind::Junk => NameKind::Junk,
            NameKind::Open { .. } | NameKind::Override { .. } | NameKind::Bound { .. } => {
                NameKind::Open {
                    real_type: Type::ANY,
                }
            }
            NameKind::CopyFromParent {
                source, force_back, ..
            } => {
                if force_back && !self.has_child(source, name) {
                    self.create_child(source, name, diag, defs);
                }
                if self.has_child(source, name) {
                    let component = [name.to_string()];
                    let inherited = self.name_lookup(source, &component, diag, defs);
                    NameKind::CopyFromParent {
                        source: inherited,
                        mask: Type::ANY,
                        force_back,
                    }
                } else {
                    NameKind::Open {
                        real_type: Type::ANY,
                    }
                }
            }
        };
        let child = self.push_name(NameInfo::new(full, env, kind));
        self.names[id.index()]
            .children
            .insert(name.to_string(), child);
        child
    }

    /// True if the name has a child `name`, directly or through the name it
    /// was copied from.
    pub fn has_child(&self, id: NameId, name: &str) -> bool {
        let info = self.name(id);
        if info.children.contains_key(name) {
            return true;
        }
        match info.kind {
            NameKind::CopyFromParent { source, .. } => self.has_child(source, name),
            _ => false,
        }
    }

    // ── Demands ──

    /// Narrow `id` to `demanded` and return the set it is proven to have.
    ///
    /// A conflict is reported against the name's environment and leaves the
    /// known set unchanged.
    pub fn ensure(
        &mut self,
        id: NameId,
        demanded: Type,
        must_unbox: bool,
        diag: &mut Diagnostics,
        defs: &mut dyn Typeable,
    ) -> Type {
        let mut current = id;
        loop {
            let (step, conflict) =
                self.names[current.index()].ensure_local(demanded, must_unbox);
            if let Some(known) = conflict {
                let info = self.name(current);
                let span = info
                    .env
                    .map(|env| self.env(env).span)
                    .unwrap_or_default();
                let name = info.name.clone();
                diag.lookup_type_error(span, &name, known, demanded);
            }
            match step {
                Step::Resolved(proven) => return proven,
                Step::Forward(source) => current = source,
                Step::Definition(node) => {
                    let proven = defs.ensure_type(self, diag, node, demanded, must_unbox);
                    self.names[current.index()].settle_bound(proven);
                    return proven;
                }
            }
        }
    }

    /// The set of kinds a name may still have.
    pub fn possible_type(&self, id: NameId) -> Type {
        match self.name(id).kind {
            NameKind::Open { real_type } | NameKind::Override { real_type } => real_type,
            NameKind::Bound { restricted, .. } => restricted,
            NameKind::CopyFromParent {
                source,
                force_back: true,
                ..
            } => self.possible_type(source),
            NameKind::CopyFromParent { source, mask, .. } => self.possible_type(source) & mask,
            NameKind::Junk => Type::ANY,
        }
    }

    /// Whether any demand on `id` required an unboxed value.
    pub fn must_unbox(&self, id: NameId) -> bool {
        let info = self.name(id);
        match info.kind {
            NameKind::CopyFromParent {
                source,
                force_back: true,
                ..
            } => info.must_unbox || self.must_unbox(source),
            _ => info.must_unbox,
        }
    }

    /// Every name of `env`, each followed by its descendants.
    pub fn all_names(&self, env: EnvId) -> Vec<NameId> {
        let mut out = Vec::new();
        for id in self.env(env).names.values().flatten() {
            self.add_all(*id, &mut out);
        }
        out
    }

    fn add_all(&self, id: NameId, out: &mut Vec<NameId>) {
        out.push(id);
        for child in self.name(id).children.values() {
            self.add_all(*child, out);
        }
    }

    /// Resolve a path against names already classified, without creating
    /// anything.
    pub fn find(&self, env: EnvId, path: &[&str]) -> Option<NameId> {
        let (first, rest) = path.split_first()?;
        let mut current = (*self.env(env).names.get(*first)?)?;
        for component in rest {
            current = *self.name(current).children.get(*component)?;
        }
        Some(current)
    }

    // ── Intrinsics ──

    /// Record a type demand on an intrinsic call in `env`.
    ///
    /// The first demand sets the entry; later ones intersect the type (a
    /// conflict is reported as an expression error) and AND the unboxing
    /// requirement.
    pub fn ensure_intrinsic(
        &mut self,
        env: EnvId,
        node: NodeId,
        ty: Type,
        must_unbox: bool,
        span: Span,
        diag: &mut Diagnostics,
    ) -> Type {
        let entry = self.envs[env.index()]
            .intrinsics
            .entry(node)
            .or_insert(Intrinsic { ty, must_unbox });
        let narrowed = entry.ty & ty;
        if narrowed.is_empty() {
            let known = entry.ty;
            diag.expression_type_error(span, known, ty);
            return known;
        }
        entry.ty = narrowed;
        entry.must_unbox &= must_unbox;
        narrowed
    }

    /// The intrinsic entry for `node`, searching `env` and its ancestors.
    pub fn intrinsic(&self, env: EnvId, node: NodeId) -> Option<Intrinsic> {
        let mut current = Some(env);
        while let Some(id) = current {
            let scope = self.env(id);
            if let Some(entry) = scope.intrinsics.get(&node) {
                return Some(*entry);
            }
            current = scope.parent;
        }
        None
    }
}
