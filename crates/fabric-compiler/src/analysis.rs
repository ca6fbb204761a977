//! Two-phase type propagation.
//!
//! Phase one walks the tree, creating an [`Environment`] for every scoping
//! construct, registering declared names and queueing every node that places
//! a type demand. Lookups are then classified in walk order. Phase two groups
//! the queued demands by environment priority and applies them lowest
//! priority first.
//!
//! Conflicts never stop the run. Every one is reported and [`Analysis`]
//! carries the accumulated result.
//!
//! [`Environment`]: crate::env::Environment

use std::collections::{BTreeMap, HashMap, HashSet};

use fabric_types::ast::{Attribute, Expr, ExprKind, NodeId, OverrideKind};
use fabric_types::{CompileErrors, ErrorCode, Span, Type};

use crate::config::AnalysisOptions;
use crate::diagnostics::Diagnostics;
use crate::env::{EnvId, Intrinsic, ScopeTree, Typeable};
use crate::names::{NameId, NameKind};

/// Analyse one unit rooted at `root`.
pub fn analyse(root: &Expr, file: &str, options: &AnalysisOptions) -> Analysis {
    let mut analyser = Analyser::new(file);
    let root_env = analyser.tree.new_root(root.span, options.top_level);

    // ── Phase 1: propagate ──
    analyser.declare(root, root_env);
    analyser.queue.push(Demand {
        node: root.id,
        env: root_env,
        root: true,
    });
    analyser.classify_lookups();
    tracing::debug!(
        file,
        environments = analyser.tree.env_count(),
        names = analyser.tree.name_count(),
        demands = analyser.queue.len(),
        "propagation finished"
    );

    // ── Phase 2: demands ──
    analyser.apply_demands();
    analyser.check_inherited_masks();

    let analysis = analyser.finish(root_env, options.clone());
    tracing::debug!(
        file,
        success = analysis.success(),
        errors = analysis.errors.total_errors,
        "analysis finished"
    );
    analysis
}

// ══════════════════════════════════════════════════════════════════════════════
// Analysis result
// ══════════════════════════════════════════════════════════════════════════════

/// What analysis learned about one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeFacts {
    /// Environment the node is evaluated in.
    pub env: EnvId,
    /// Kinds the node may still produce.
    pub proven: Type,
}

/// The outcome of [`analyse`]. Read-only once built.
#[derive(Debug, Clone)]
pub struct Analysis {
    file: String,
    options: AnalysisOptions,
    tree: ScopeTree,
    root: EnvId,
    facts: HashMap<NodeId, NodeFacts>,
    lookups: HashMap<NodeId, NameId>,
    bindings: HashMap<NodeId, NameId>,
    scopes: HashMap<NodeId, EnvId>,
    errors: CompileErrors,
}

impl Analysis {
    /// True if no error was reported.
    pub fn success(&self) -> bool {
        !self.errors.has_errors()
    }

    pub fn errors(&self) -> &CompileErrors {
        &self.errors
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn tree(&self) -> &ScopeTree {
        &self.tree
    }

    pub fn root_env(&self) -> EnvId {
        self.root
    }

    pub fn facts(&self, node: NodeId) -> Option<NodeFacts> {
        self.facts.get(&node).copied()
    }

    /// Kinds `node` is proven to produce.
    pub fn node_type(&self, node: NodeId) -> Option<Type> {
        self.facts(node).map(|facts| facts.proven)
    }

    /// Environment `node` is evaluated in.
    pub fn env_of(&self, node: NodeId) -> Option<EnvId> {
        self.facts(node).map(|facts| facts.env)
    }

    /// Environment opened by a frame, template, instantiation, `Let` or
    /// `Hide` node.
    pub fn scope_of(&self, node: NodeId) -> Option<EnvId> {
        self.scopes.get(&node).copied()
    }

    /// Name a lookup node resolved to.
    pub fn name_of(&self, node: NodeId) -> Option<NameId> {
        self.lookups.get(&node).copied()
    }

    /// Bound name defined by an attribute value node.
    pub fn binding_of(&self, node: NodeId) -> Option<NameId> {
        self.bindings.get(&node).copied()
    }

    pub fn possible_type(&self, name: NameId) -> Type {
        self.tree.possible_type(name)
    }

    pub fn must_unbox(&self, name: NameId) -> bool {
        self.tree.must_unbox(name)
    }

    /// Find an already classified dotted name in `env`.
    pub fn find_name(&self, env: EnvId, path: &str) -> Option<NameId> {
        let components: Vec<&str> = path.split('.').collect();
        self.tree.find(env, &components)
    }

    /// Intrinsic entry recorded for `node`.
    pub fn intrinsic(&self, node: NodeId) -> Option<Intrinsic> {
        self.tree.intrinsic(self.env_of(node)?, node)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Node tables
// ══════════════════════════════════════════════════════════════════════════════

/// Per-node state; supplies definitions to bound names.
#[derive(Default)]
struct Nodes<'a> {
    exprs: HashMap<NodeId, &'a Expr>,
    facts: HashMap<NodeId, NodeFacts>,
    lookups: HashMap<NodeId, NameId>,
    bindings: HashMap<NodeId, NameId>,
    scopes: HashMap<NodeId, EnvId>,
    /// Nodes whose demand is being applied.
    in_progress: HashSet<NodeId>,
    /// Lookups being classified.
    resolving: HashSet<NodeId>,
}

impl Typeable for Nodes<'_> {
    fn ensure_type(
        &mut self,
        tree: &mut ScopeTree,
        diag: &mut Diagnostics,
        node: NodeId,
        demanded: Type,
        must_unbox: bool,
    ) -> Type {
        self.ensure_node(tree, diag, node, demanded, must_unbox)
    }
}

impl<'a> Nodes<'a> {
    fn ensure_node(
        &mut self,
        tree: &mut ScopeTree,
        diag: &mut Diagnostics,
        id: NodeId,
        demanded: Type,
        must_unbox: bool,
    ) -> Type {
        let (Some(expr), Some(facts)) = (self.exprs.get(&id).copied(), self.facts.get(&id).copied())
        else {
            return demanded;
        };
        if !self.in_progress.insert(id) {
            // Self-referential definition; the bound name keeps what it has.
            return facts.proven;
        }

        let result = match &expr.kind {
            ExprKind::Literal(literal) => leaf(diag, expr.span, literal.ty(), demanded),
            ExprKind::Frame(_) | ExprKind::Instantiate { .. } => {
                leaf(diag, expr.span, Type::FRAME, demanded)
            }
            ExprKind::Template(_) => leaf(diag, expr.span, Type::TEMPLATE, demanded),
            ExprKind::Lookup(_) => match self.resolve_lookup(tree, diag, id) {
                Some(name) => tree.ensure(name, demanded, must_unbox, diag, self),
                None => demanded,
            },
            ExprKind::Coalesce { primary, fallback } => {
                let fallback = self.ensure_node(tree, diag, fallback.id, demanded, must_unbox);
                let primary = self.ensure_node(
                    tree,
                    diag,
                    primary.id,
                    demanded | Type::UNIT,
                    must_unbox,
                );
                let merged = Type::coalescing_merge(primary, demanded);
                let result = (merged.difference(Type::UNIT) | fallback) & demanded;
                if result.is_empty() {
                    fallback
                } else {
                    result
                }
            }
            ExprKind::Conditional {
                then_branch,
                else_branch,
                ..
            } => {
                let then = self.ensure_node(tree, diag, then_branch.id, demanded, must_unbox);
                let otherwise = self.ensure_node(tree, diag, else_branch.id, demanded, must_unbox);
                let union = then | otherwise;
                let result = union & demanded;
                if result.is_empty() {
                    union
                } else {
                    result
                }
            }
            ExprKind::Arithmetic { left, right, .. } => {
                let left = self.ensure_node(tree, diag, left.id, Type::NUMBER, true);
                let right = self.ensure_node(tree, diag, right.id, Type::NUMBER, true);
                let mut natural = Type::empty();
                if left.contains(Type::INT) && right.contains(Type::INT) {
                    natural |= Type::INT;
                }
                if (left | right).contains(Type::FLOAT) {
                    natural |= Type::FLOAT;
                }
                if natural.is_empty() {
                    natural = Type::NUMBER;
                }
                tree.ensure_intrinsic(facts.env, id, natural, true, expr.span, diag);
                tree.ensure_intrinsic(facts.env, id, demanded, must_unbox, expr.span, diag)
            }
            ExprKind::Enforce { value, ty } => {
                self.ensure_node(tree, diag, value.id, *ty, true);
                leaf(diag, expr.span, *ty, demanded)
            }
            ExprKind::Let { body, .. } | ExprKind::Hide { body, .. } => {
                self.ensure_node(tree, diag, body.id, demanded, must_unbox)
            }
        };

        self.in_progress.remove(&id);
        if let Some(facts) = self.facts.get_mut(&id) {
            let narrowed = facts.proven & result;
            if !narrowed.is_empty() {
                facts.proven = narrowed;
            }
        }
        result
    }

    /// Classify the name a lookup node refers to, once.
    ///
    /// Returns `None` while the same lookup is already being classified.
    fn resolve_lookup(
        &mut self,
        tree: &mut ScopeTree,
        diag: &mut Diagnostics,
        id: NodeId,
    ) -> Option<NameId> {
        if let Some(name) = self.lookups.get(&id) {
            return Some(*name);
        }
        let expr: &'a Expr = self.exprs.get(&id).copied()?;
        let env = self.facts.get(&id)?.env;
        let ExprKind::Lookup(names) = &expr.kind else {
            return None;
        };
        if !self.resolving.insert(id) {
            return None;
        }
        let name = tree.lookup(env, names, expr.span, diag, self);
        self.resolving.remove(&id);
        self.lookups.insert(id, name);
        Some(name)
    }
}

/// A node with a fixed natural type.
fn leaf(diag: &mut Diagnostics, span: Span, natural: Type, demanded: Type) -> Type {
    let narrowed = natural & demanded;
    if narrowed.is_empty() {
        diag.expression_type_error(span, natural, demanded);
        natural
    } else {
        narrowed
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Driver
// ══════════════════════════════════════════════════════════════════════════════

/// A node queued during phase one, tagged with the environment whose
/// priority orders it.
#[derive(Debug, Clone, Copy)]
struct Demand {
    node: NodeId,
    env: EnvId,
    root: bool,
}

struct Analyser<'a> {
    tree: ScopeTree,
    diag: Diagnostics,
    nodes: Nodes<'a>,
    queue: Vec<Demand>,
    pending_lookups: Vec<NodeId>,
}

impl<'a> Analyser<'a> {
    fn new(file: &str) -> Self {
        Self {
            tree: ScopeTree::new(),
            diag: Diagnostics::new(file),
            nodes: Nodes::default(),
            queue: Vec::new(),
            pending_lookups: Vec::new(),
        }
    }

    fn enqueue(&mut self, node: NodeId, env: EnvId) {
        self.queue.push(Demand {
            node,
            env,
            root: false,
        });
    }

    fn open_scope(&mut self, expr: &Expr, env: EnvId, force_back: bool) -> EnvId {
        let scope = self.tree.new_child(env, expr.span, force_back);
        self.nodes.scopes.insert(expr.id, scope);
        scope
    }

    // ── Phase 1 ──

    fn declare(&mut self, expr: &'a Expr, env: EnvId) {
        self.nodes.exprs.insert(expr.id, expr);
        self.nodes.facts.insert(
            expr.id,
            NodeFacts {
                env,
                proven: Type::ANY,
            },
        );

        match &expr.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Lookup(_) => self.pending_lookups.push(expr.id),
            ExprKind::Coalesce { primary, fallback } => {
                self.declare(primary, env);
                self.declare(fallback, env);
            }
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                self.declare(condition, env);
                self.declare(then_branch, env);
                self.declare(else_branch, env);
                self.enqueue(expr.id, env);
            }
            ExprKind::Arithmetic { left, right, .. } => {
                self.declare(left, env);
                self.declare(right, env);
                self.enqueue(expr.id, env);
            }
            ExprKind::Enforce { value, .. } => {
                self.declare(value, env);
                self.enqueue(expr.id, env);
            }
            ExprKind::Frame(attributes) | ExprKind::Template(attributes) => {
                let scope = self.open_scope(expr, env, false);
                self.declare_attributes(scope, attributes);
                self.enqueue(expr.id, scope);
            }
            ExprKind::Let { bindings, body } => {
                let scope = self.open_scope(expr, env, true);
                self.declare_attributes(scope, bindings);
                self.declare(body, scope);
                self.enqueue(expr.id, scope);
            }
            ExprKind::Hide { names, body } => {
                let scope = self.open_scope(expr, env, true);
                for name in names {
                    self.tree.add_forbidden(scope, name);
                }
                self.declare(body, scope);
            }
            ExprKind::Instantiate {
                template,
                overrides,
            } => {
                self.declare(template, env);
                let scope = self.open_scope(expr, env, false);
                for o in overrides {
                    self.bind(scope, &o.name, o.kind.value(), o.span);
                }
                for o in overrides {
                    match &o.kind {
                        OverrideKind::Replace(value) => self.declare(value, scope),
                        OverrideKind::Amend { original, body } => {
                            let body_scope = self.tree.new_child(scope, body.span, false);
                            self.tree.add_override_name(body_scope, original);
                            self.declare(body, body_scope);
                        }
                    }
                }
                self.enqueue(expr.id, scope);
            }
        }
    }

    fn declare_attributes(&mut self, scope: EnvId, attributes: &'a [Attribute]) {
        for attribute in attributes {
            self.bind(scope, &attribute.name, &attribute.value, attribute.span);
        }
        for attribute in attributes {
            self.declare(&attribute.value, scope);
        }
    }

    fn bind(&mut self, scope: EnvId, name: &str, value: &Expr, span: Span) {
        match self.tree.add_bound(scope, name, value.id) {
            Some(id) => {
                self.nodes.bindings.insert(value.id, id);
            }
            None => self.diag.error(
                ErrorCode::DUPLICATE_ATTRIBUTE,
                format!("Duplicate attribute “{name}”."),
                span,
            ),
        }
    }

    fn classify_lookups(&mut self) {
        for id in std::mem::take(&mut self.pending_lookups) {
            self.nodes.resolve_lookup(&mut self.tree, &mut self.diag, id);
        }
    }

    // ── Phase 2 ──

    fn apply_demands(&mut self) {
        let mut groups: BTreeMap<u32, Vec<Demand>> = BTreeMap::new();
        for demand in std::mem::take(&mut self.queue) {
            groups
                .entry(self.tree.env(demand.env).priority())
                .or_default()
                .push(demand);
        }
        for (priority, demands) in groups {
            tracing::trace!(priority, count = demands.len(), "applying demands");
            for demand in demands {
                self.make_demands(demand);
            }
        }
    }

    /// Once every demand has run, a masked inherited name must still share a
    /// kind with its source, otherwise no value could ever satisfy it.
    fn check_inherited_masks(&mut self) {
        let mut empty = Vec::new();
        for (_, info) in self.tree.names() {
            let NameKind::CopyFromParent {
                source,
                mask,
                force_back: false,
            } = info.kind()
            else {
                continue;
            };
            let known = self.tree.possible_type(*source);
            if !known.intersects(*mask) {
                let span = match info.env() {
                    Some(env) => self.tree.env(env).span(),
                    None => Span::default(),
                };
                empty.push((span, info.name().to_string(), known, *mask));
            }
        }
        for (span, name, known, mask) in empty {
            self.diag.inherited_mask_error(span, &name, known, mask);
        }
    }

    fn make_demands(&mut self, demand: Demand) {
        if demand.root {
            self.ensure(demand.node, Type::ANY, false);
            return;
        }
        let Some(expr) = self.nodes.exprs.get(&demand.node).copied() else {
            return;
        };
        match &expr.kind {
            ExprKind::Conditional { condition, .. } => {
                self.ensure(condition.id, Type::BOOL, false);
            }
            ExprKind::Arithmetic { .. } | ExprKind::Enforce { .. } => {
                self.ensure(expr.id, Type::ANY, false);
            }
            ExprKind::Frame(attributes)
            | ExprKind::Template(attributes)
            | ExprKind::Let {
                bindings: attributes,
                ..
            } => {
                for attribute in attributes {
                    self.ensure_binding(&attribute.value);
                }
            }
            ExprKind::Instantiate {
                template,
                overrides,
            } => {
                self.ensure(template.id, Type::TEMPLATE, false);
                for o in overrides {
                    self.ensure_binding(o.kind.value());
                }
            }
            _ => {}
        }
    }

    fn ensure(&mut self, node: NodeId, demanded: Type, must_unbox: bool) -> Type {
        self.nodes
            .ensure_node(&mut self.tree, &mut self.diag, node, demanded, must_unbox)
    }

    /// Demand an attribute value through its bound name so the name records
    /// the definition's proven type.
    fn ensure_binding(&mut self, value: &Expr) {
        match self.nodes.bindings.get(&value.id).copied() {
            Some(name) => {
                self.tree
                    .ensure(name, Type::ANY, false, &mut self.diag, &mut self.nodes);
            }
            None => {
                self.ensure(value.id, Type::ANY, false);
            }
        }
    }

    fn finish(self, root: EnvId, options: AnalysisOptions) -> Analysis {
        let file = self.diag.file().to_string();
        Analysis {
            file,
            options,
            tree: self.tree,
            root,
            facts: self.nodes.facts,
            lookups: self.nodes.lookups,
            bindings: self.nodes.bindings,
            scopes: self.nodes.scopes,
            errors: self.diag.into_errors(),
        }
    }
}
