//! Scope resolution for the code generator.
//!
//! When the generator enters a scope on one control-flow path it asks which
//! names must be fetched, which need a single runtime check, and which have
//! to be dispatched over. Names whose kind is not known ahead of time are
//! enumerated as a Cartesian product of their possible kinds, one branch per
//! combination, each branch with its own [`LookupCache`].

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use fabric_types::{CompileErrors, ErrorCode, FabricError, Type};

use crate::analysis::Analysis;
use crate::env::EnvId;
use crate::error::{ResolveError, ResolveResult};
use crate::names::{NameId, NameKind};

// ══════════════════════════════════════════════════════════════════════════════
// Values
// ══════════════════════════════════════════════════════════════════════════════

/// How generated code obtains a name's value on one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loadable {
    /// A contextual lookup of the dotted name at run time.
    Lookup(String),
    /// The value an amending override replaces.
    Original,
    /// A value the scope writes itself, boxed, holding one of `ty`.
    Special { name: String, ty: Type },
    /// `source` after a checked conversion to the single kind `ty`.
    Unboxed { source: Box<Loadable>, ty: Type },
}

impl Loadable {
    /// Kinds the generated code can rely on without inspecting the value.
    /// Boxed values report every kind.
    pub fn backing_type(&self) -> Type {
        match self {
            Loadable::Unboxed { ty, .. } => *ty,
            _ => Type::ANY,
        }
    }
}

/// A name fetched when entering a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedName {
    pub name: NameId,
    pub value: Loadable,
    /// Kinds the name may have on this path.
    pub possible: Type,
    pub needs_unbox: bool,
}

impl LoadedName {
    pub fn types(&self) -> Vec<Type> {
        self.possible.members().collect()
    }

    pub fn singly_typed(&self) -> bool {
        self.possible.is_singleton()
    }

    /// Usable as loaded, without a check or dispatch.
    pub fn direct_copy(&self) -> bool {
        self.value.backing_type() != Type::ANY || !self.needs_unbox
    }
}

/// A value written by the scope itself, e.g. an iteration variable, with the
/// kinds it is known to take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Special {
    pub name: String,
    pub observed: Type,
}

// ══════════════════════════════════════════════════════════════════════════════
// LookupCache
// ══════════════════════════════════════════════════════════════════════════════

/// Names already bound on the current path, layered over the enclosing
/// scope's cache.
#[derive(Debug, Clone, Default)]
pub struct LookupCache {
    parent: Option<Rc<LookupCache>>,
    values: HashMap<NameId, Loadable>,
}

impl LookupCache {
    pub fn new(parent: Option<Rc<LookupCache>>) -> Self {
        Self {
            parent,
            values: HashMap::new(),
        }
    }

    pub fn get(&self, name: NameId) -> Option<&Loadable> {
        match self.values.get(&name) {
            Some(value) => Some(value),
            None => self.parent.as_deref().and_then(|parent| parent.get(name)),
        }
    }

    pub fn contains(&self, name: NameId) -> bool {
        self.get(name).is_some()
    }

    pub fn insert(&mut self, name: NameId, value: Loadable) {
        self.values.insert(name, value);
    }

    /// Entries added at this layer.
    pub fn local_len(&self) -> usize {
        self.values.len()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ScopeResolver
// ══════════════════════════════════════════════════════════════════════════════

/// What entering one scope required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeResolution {
    /// Names fetched on entry, in environment order.
    pub loads: Vec<LoadedName>,
    /// Names checked once to hold a single kind and then used unboxed.
    pub checks: Vec<(NameId, Type)>,
    /// Names dispatched over, with the kinds their branches cover.
    pub dispatch: Vec<(NameId, Type)>,
    /// Number of times the scope body was generated.
    pub branches: usize,
}

/// Callback run once per generated branch of a scope.
pub type BranchBody<'r, 'a> = dyn FnMut(&mut ScopeResolver<'a>, &Rc<LookupCache>) + 'r;

/// Walks scopes on behalf of the code generator.
pub struct ScopeResolver<'a> {
    analysis: &'a Analysis,
    /// Branches the current path has been multiplied into.
    paths: usize,
    warned: HashSet<EnvId>,
    diagnostics: CompileErrors,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(analysis: &'a Analysis) -> Self {
        Self {
            analysis,
            paths: 1,
            warned: HashSet::new(),
            diagnostics: CompileErrors::empty(),
        }
    }

    pub fn paths(&self) -> usize {
        self.paths
    }

    /// Narrowing violations and dispatch warnings met so far.
    pub fn diagnostics(&self) -> &CompileErrors {
        &self.diagnostics
    }

    /// Whether `name` has to be fetched given what `cache` already holds.
    pub fn needs_load(&self, name: NameId, cache: Option<&LookupCache>) -> bool {
        let tree = self.analysis.tree();
        match tree.name(name).kind() {
            NameKind::Open { .. } => true,
            NameKind::Override { .. } | NameKind::Junk => false,
            NameKind::Bound { .. } => !cache.is_some_and(|cache| cache.contains(name)),
            NameKind::CopyFromParent { source, .. } => {
                match cache.and_then(|cache| cache.get(*source)) {
                    None => true,
                    Some(value) => tree.must_unbox(name) && value.backing_type() == Type::ANY,
                }
            }
        }
    }

    /// Describe how to fetch `name` on the current path.
    pub fn load(&self, name: NameId, cache: Option<&LookupCache>) -> ResolveResult<LoadedName> {
        let tree = self.analysis.tree();
        let info = tree.name(name);
        let value = match info.kind() {
            NameKind::Junk => return Err(ResolveError::InvalidName(info.name().to_string())),
            NameKind::Override { .. } => Loadable::Original,
            NameKind::Open { .. } | NameKind::Bound { .. } => {
                Loadable::Lookup(info.name().to_string())
            }
            NameKind::CopyFromParent { source, .. } => cache
                .and_then(|cache| cache.get(*source))
                .cloned()
                .unwrap_or_else(|| Loadable::Lookup(info.name().to_string())),
        };
        Ok(LoadedName {
            name,
            value,
            possible: tree.possible_type(name),
            needs_unbox: tree.must_unbox(name),
        })
    }

    /// Check every inherited name of `env` against the value its ancestor
    /// holds on this path.
    ///
    /// Compatible values are copied into `next`. Returns the violations, one
    /// line per name, or `None` if there were none.
    pub fn check_valid_narrowing(
        &self,
        env: EnvId,
        next: &mut LookupCache,
        current: &LookupCache,
    ) -> Option<String> {
        let tree = self.analysis.tree();
        let mut errors = Vec::new();
        for id in tree.all_names(env) {
            let info = tree.name(id);
            let NameKind::CopyFromParent { source, mask, .. } = info.kind() else {
                continue;
            };
            let Some(parent_value) = current.get(*source) else {
                continue;
            };
            let union = parent_value.backing_type();
            if union.intersects(*mask) {
                next.insert(id, parent_value.clone());
            } else {
                errors.push(format!(
                    "Value for “{}” must be {}, but it is {}.",
                    info.name(),
                    mask,
                    union
                ));
            }
        }
        if errors.is_empty() {
            None
        } else {
            Some(errors.join("\n"))
        }
    }

    /// Bind the names of `env` on the current path and run `body` once for
    /// every combination of kinds the dispatched names can take.
    pub fn resolve_scope(
        &mut self,
        env: EnvId,
        specials: &[Special],
        current: Option<&Rc<LookupCache>>,
        body: &mut BranchBody<'_, 'a>,
    ) -> ResolveResult<ScopeResolution> {
        let analysis = self.analysis;
        let tree = analysis.tree();
        let names = tree.all_names(env);

        let mut base = LookupCache::new(current.cloned());
        for &id in &names {
            if matches!(tree.name(id).kind(), NameKind::Override { .. }) {
                base.insert(id, Loadable::Original);
            }
        }
        if let Some(current) = current {
            if let Some(message) = self.check_valid_narrowing(env, &mut base, current) {
                self.diagnostics.push_error(FabricError::new(
                    analysis.file(),
                    ErrorCode::NARROWING_VIOLATION,
                    message.clone(),
                    tree.env(env).span(),
                ));
                return Err(ResolveError::NarrowingViolation { message });
            }
        }

        // Specials arrive boxed and are checked or dispatched like fetched
        // names; everything else is fetched after them in environment order.
        let mut loads = Vec::new();
        let mut written = HashSet::new();
        for special in specials {
            let Some(id) = tree.env(env).local(&special.name) else {
                continue;
            };
            let ty = tree.possible_type(id) & special.observed;
            written.insert(id);
            loads.push(LoadedName {
                name: id,
                value: Loadable::Special {
                    name: special.name.clone(),
                    ty,
                },
                possible: ty,
                needs_unbox: tree.must_unbox(id),
            });
        }
        for id in names {
            if written.contains(&id) || !self.needs_load(id, Some(&base)) {
                continue;
            }
            loads.push(self.load(id, Some(&base))?);
        }

        let mut checks = Vec::new();
        let mut permutable = Vec::new();
        for loaded in &loads {
            if loaded.possible.is_empty() {
                return Err(ResolveError::Uninhabited(
                    tree.name(loaded.name).name().to_string(),
                ));
            }
            if loaded.direct_copy() {
                base.insert(loaded.name, loaded.value.clone());
            } else if loaded.singly_typed() {
                base.insert(
                    loaded.name,
                    Loadable::Unboxed {
                        source: Box::new(loaded.value.clone()),
                        ty: loaded.possible,
                    },
                );
                checks.push((loaded.name, loaded.possible));
            } else {
                permutable.push(loaded.clone());
            }
        }

        let old_paths = self.paths;
        for loaded in &permutable {
            self.paths = self.paths.saturating_mul(loaded.possible.len().max(1));
        }
        if self.paths > analysis.options().dispatch_path_limit && self.warned.insert(env) {
            let span = tree.env(env).span();
            let message = format!(
                "There are {} type-derived flows in the generated code. This will be slow to compile.",
                self.paths
            );
            tracing::warn!(file = analysis.file(), %span, paths = self.paths, "{message}");
            self.diagnostics.push_warning(FabricError::warning(
                analysis.file(),
                ErrorCode::DISPATCH_EXPLOSION,
                message,
                span,
            ));
        }

        let base = Rc::new(base);
        let branches = self.permute(&permutable, 0, &base, body);
        self.paths = old_paths;
        tracing::trace!(env = env.index(), loads = loads.len(), branches, "resolved scope");

        Ok(ScopeResolution {
            loads,
            checks,
            dispatch: permutable
                .iter()
                .map(|loaded| (loaded.name, loaded.possible))
                .collect(),
            branches,
        })
    }

    fn permute(
        &mut self,
        permutable: &[LoadedName],
        index: usize,
        cache: &Rc<LookupCache>,
        body: &mut BranchBody<'_, 'a>,
    ) -> usize {
        let Some(loaded) = permutable.get(index) else {
            body(self, cache);
            return 1;
        };
        let mut branches = 0;
        for ty in loaded.possible.members() {
            let mut next = LookupCache::new(Some(Rc::clone(cache)));
            next.insert(
                loaded.name,
                Loadable::Unboxed {
                    source: Box::new(loaded.value.clone()),
                    ty,
                },
            );
            branches += self.permute(permutable, index + 1, &Rc::new(next), body);
        }
        branches
    }
}
