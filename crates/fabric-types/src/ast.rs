//! Interface-level AST consumed by static analysis.
//!
//! The front end that produces these nodes lives elsewhere; this module only
//! fixes the shapes the analysis walks. Every node carries a [`NodeId`],
//! unique within one analysed unit, and a [`Span`] for error reporting.
//! [`AstBuilder`] hands out fresh ids for programmatic construction.

use crate::{Span, Type};

// ══════════════════════════════════════════════════════════════════════════════
// Nodes
// ══════════════════════════════════════════════════════════════════════════════

/// Identity of a node within one analysed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Float(f64),
    Int(i64),
    Str(String),
    Null,
    Bin(Vec<u8>),
}

impl Literal {
    /// The single kind this literal has.
    pub fn ty(&self) -> Type {
        match self {
            Literal::Bool(_) => Type::BOOL,
            Literal::Float(_) => Type::FLOAT,
            Literal::Int(_) => Type::INT,
            Literal::Str(_) => Type::STR,
            Literal::Null => Type::UNIT,
            Literal::Bin(_) => Type::BIN,
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
}

/// `name: value` inside a frame, template, or `Let`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

/// An attribute supplied when instantiating a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub name: String,
    pub kind: OverrideKind,
    pub span: Span,
}

/// How an instantiation changes one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideKind {
    /// `name: value` replaces whatever the template defined.
    Replace(Expr),
    /// `name +original: body`: `body` may consult the value being overridden
    /// through the alias `original`.
    Amend { original: String, body: Expr },
}

impl OverrideKind {
    /// The expression that defines the new attribute value.
    pub fn value(&self) -> &Expr {
        match self {
            OverrideKind::Replace(value) => value,
            OverrideKind::Amend { body, .. } => body,
        }
    }
}

/// Expression kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    /// Contextual lookup of a dotted name, e.g. `a.b.c`.
    Lookup(Vec<String>),
    /// `primary ?? fallback`
    Coalesce {
        primary: Box<Expr>,
        fallback: Box<Expr>,
    },
    /// `If condition Then then_branch Else else_branch`
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Arithmetic {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `value As ty`: a checked conversion to one of the kinds in `ty`.
    Enforce { value: Box<Expr>, ty: Type },
    /// `{ attributes }`
    Frame(Vec<Attribute>),
    /// `Template { attributes }`
    Template(Vec<Attribute>),
    /// `template { overrides }`
    Instantiate {
        template: Box<Expr>,
        overrides: Vec<Override>,
    },
    /// `Let bindings In body`
    Let {
        bindings: Vec<Attribute>,
        body: Box<Expr>,
    },
    /// Makes `names` inaccessible within `body`.
    Hide { names: Vec<String>, body: Box<Expr> },
}

// ══════════════════════════════════════════════════════════════════════════════
// Builder
// ══════════════════════════════════════════════════════════════════════════════

/// Builds nodes with fresh [`NodeId`]s.
///
/// Each node gets a point span on line 1 whose column is its id plus one,
/// unless a line has been selected with [`AstBuilder::at_line`].
#[derive(Debug, Default)]
pub struct AstBuilder {
    next_id: u32,
    line: u32,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            line: 1,
        }
    }

    /// Place subsequently built nodes on `line`.
    pub fn at_line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    fn node(&mut self, kind: ExprKind) -> Expr {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        Expr {
            id,
            kind,
            span: Span::point(self.line.max(1), id.0 + 1),
        }
    }

    pub fn bool(&mut self, value: bool) -> Expr {
        self.node(ExprKind::Literal(Literal::Bool(value)))
    }

    pub fn float(&mut self, value: f64) -> Expr {
        self.node(ExprKind::Literal(Literal::Float(value)))
    }

    pub fn int(&mut self, value: i64) -> Expr {
        self.node(ExprKind::Literal(Literal::Int(value)))
    }

    pub fn str(&mut self, value: &str) -> Expr {
        self.node(ExprKind::Literal(Literal::Str(value.to_string())))
    }

    pub fn null(&mut self) -> Expr {
        self.node(ExprKind::Literal(Literal::Null))
    }

    pub fn bin(&mut self, value: &[u8]) -> Expr {
        self.node(ExprKind::Literal(Literal::Bin(value.to_vec())))
    }

    /// A lookup of a dotted path; `"a.b"` becomes `["a", "b"]`.
    ///
    /// An empty string yields an empty path.
    pub fn lookup(&mut self, path: &str) -> Expr {
        let names = if path.is_empty() {
            Vec::new()
        } else {
            path.split('.').map(str::to_string).collect()
        };
        self.node(ExprKind::Lookup(names))
    }

    pub fn coalesce(&mut self, primary: Expr, fallback: Expr) -> Expr {
        self.node(ExprKind::Coalesce {
            primary: Box::new(primary),
            fallback: Box::new(fallback),
        })
    }

    pub fn conditional(&mut self, condition: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
        self.node(ExprKind::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    pub fn arithmetic(&mut self, op: ArithOp, left: Expr, right: Expr) -> Expr {
        self.node(ExprKind::Arithmetic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn add(&mut self, left: Expr, right: Expr) -> Expr {
        self.arithmetic(ArithOp::Add, left, right)
    }

    pub fn enforce(&mut self, value: Expr, ty: Type) -> Expr {
        self.node(ExprKind::Enforce {
            value: Box::new(value),
            ty,
        })
    }

    pub fn frame(&mut self, attributes: Vec<(&str, Expr)>) -> Expr {
        let attributes = Self::attributes(attributes);
        self.node(ExprKind::Frame(attributes))
    }

    pub fn template(&mut self, attributes: Vec<(&str, Expr)>) -> Expr {
        let attributes = Self::attributes(attributes);
        self.node(ExprKind::Template(attributes))
    }

    pub fn instantiate(&mut self, template: Expr, overrides: Vec<Override>) -> Expr {
        self.node(ExprKind::Instantiate {
            template: Box::new(template),
            overrides,
        })
    }

    /// `name: value` as an instantiation override.
    pub fn replace(&self, name: &str, value: Expr) -> Override {
        Override {
            name: name.to_string(),
            span: value.span,
            kind: OverrideKind::Replace(value),
        }
    }

    /// `name +original: body` as an instantiation override.
    pub fn amend(&self, name: &str, original: &str, body: Expr) -> Override {
        Override {
            name: name.to_string(),
            span: body.span,
            kind: OverrideKind::Amend {
                original: original.to_string(),
                body,
            },
        }
    }

    pub fn let_in(&mut self, bindings: Vec<(&str, Expr)>, body: Expr) -> Expr {
        let bindings = Self::attributes(bindings);
        self.node(ExprKind::Let {
            bindings,
            body: Box::new(body),
        })
    }

    pub fn hide(&mut self, names: &[&str], body: Expr) -> Expr {
        self.node(ExprKind::Hide {
            names: names.iter().map(|n| n.to_string()).collect(),
            body: Box::new(body),
        })
    }

    fn attributes(attributes: Vec<(&str, Expr)>) -> Vec<Attribute> {
        attributes
            .into_iter()
            .map(|(name, value)| Attribute {
                name: name.to_string(),
                span: value.span,
                value,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_ids_are_fresh() {
        let mut b = AstBuilder::new();
        let one = b.int(1);
        let two = b.int(2);
        let sum = b.add(one, two);
        let ExprKind::Arithmetic { left, right, .. } = &sum.kind else {
            panic!("expected arithmetic, got {:?}", sum.kind);
        };
        assert_ne!(left.id, right.id);
        assert_ne!(sum.id, left.id);
        assert_eq!(sum.id, NodeId(2));
    }

    #[test]
    fn test_builder_lookup_splits_path() {
        let mut b = AstBuilder::new();
        let lookup = b.lookup("a.b.c");
        assert_eq!(
            lookup.kind,
            ExprKind::Lookup(vec!["a".into(), "b".into(), "c".into()])
        );
        let empty = b.lookup("");
        assert_eq!(empty.kind, ExprKind::Lookup(Vec::new()));
    }

    #[test]
    fn test_builder_line_selection() {
        let mut b = AstBuilder::new();
        b.at_line(7);
        let node = b.null();
        assert_eq!(node.span, Span::point(7, 1));
    }

    #[test]
    fn test_literal_types() {
        assert_eq!(Literal::Null.ty(), Type::UNIT);
        assert_eq!(Literal::Float(1.5).ty(), Type::FLOAT);
        assert_eq!(Literal::Bin(vec![1]).ty(), Type::BIN);
    }

    #[test]
    fn test_override_value() {
        let mut b = AstBuilder::new();
        let body = b.lookup("original");
        let amend = b.amend("x", "original", body.clone());
        assert_eq!(amend.kind.value(), &body);
    }
}
