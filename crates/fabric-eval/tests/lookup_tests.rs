//! Runtime lookup tests.
//!
//! Frames are built with pending attributes and produced by hand so each
//! test controls the order in which answers reach the lookup.

use std::cell::RefCell;
use std::rc::Rc;

use fabric_eval::{
    Context, Frame, FrameBuilder, Lookup, LookupError, LookupMode, LookupResult, Value,
};
use fabric_types::Type;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn empty() -> Rc<Frame> {
    FrameBuilder::new().build()
}

fn with(name: &str, value: Value) -> Rc<Frame> {
    FrameBuilder::new().ready(name, value).build()
}

fn pending(name: &str) -> Rc<Frame> {
    FrameBuilder::new().pending(name).build()
}

fn context(frames: &[&Rc<Frame>]) -> Context {
    Context::from_frames(frames.iter().map(|f| Rc::clone(f)))
}

fn not_found(name: &str, frames: usize) -> LookupResult {
    Err(LookupError::NameNotFound {
        name: name.into(),
        frames,
    })
}

/// Counts listener invocations and keeps the last result.
fn listen(lookup: &Lookup) -> Rc<RefCell<Vec<LookupResult>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    lookup.notify(move |result| sink.borrow_mut().push(result.clone()));
    seen
}

// ══════════════════════════════════════════════════════════════════════════════
// Precedence
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn earlier_frame_wins_despite_later_answer_first() {
    let a = empty();
    let b = pending("x");
    let c = pending("x");
    let lookup = Lookup::contextual(&context(&[&a, &b, &c]), &["x"]);

    c.fulfil("x", Value::Int(3)).unwrap();
    assert!(!lookup.is_committed());

    b.fulfil("x", Value::Int(2)).unwrap();
    assert_eq!(lookup.result(), Some(Ok(Value::Int(2))));
}

#[test]
fn ready_later_frame_waits_for_pending_earlier_one() {
    let a = pending("x");
    let b = with("x", Value::Int(9));
    let lookup = Lookup::contextual(&context(&[&a, &b]), &["x"]);
    assert!(!lookup.is_committed());

    a.fulfil("x", Value::str("first")).unwrap();
    assert_eq!(lookup.result(), Some(Ok(Value::str("first"))));
}

#[test]
fn missing_earlier_frames_are_skipped() {
    let a = empty();
    let b = empty();
    let c = with("x", Value::Bool(false));
    let lookup = Lookup::contextual(&context(&[&a, &b, &c]), &["x"]);
    assert_eq!(lookup.result(), Some(Ok(Value::Bool(false))));
}

#[test]
fn appended_frame_searched_last() {
    let inner = with("x", Value::Int(1));
    let outer = with("x", Value::Int(2));
    let ctx = Context::empty().prepend(inner).append(outer);
    let lookup = Lookup::contextual(&ctx, &["x"]);
    assert_eq!(lookup.result(), Some(Ok(Value::Int(1))));
}

// ══════════════════════════════════════════════════════════════════════════════
// Drilling
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn drilling_through_nested_frames() {
    let leaf = with("z", Value::Int(7));
    let middle = with("y", Value::Frame(leaf));
    let top = with("x", Value::Frame(middle));
    let lookup = Lookup::contextual(&context(&[&top]), &["x", "y", "z"]);
    assert_eq!(lookup.result(), Some(Ok(Value::Int(7))));
}

#[test]
fn drilling_into_scalar_fails() {
    let a = with("x", Value::Int(5));
    let lookup = Lookup::contextual(&context(&[&a]), &["x", "y"]);
    assert_eq!(
        lookup.result(),
        Some(Err(LookupError::NotAFrame {
            name: "x.y".into(),
            component: "x".into(),
            found: Type::INT,
        }))
    );
}

#[test]
fn scalar_in_earlier_frame_does_not_hide_later_match() {
    let a = with("x", Value::Int(5));
    let b = with("x", Value::Frame(with("y", Value::Int(1))));
    let lookup = Lookup::contextual(&context(&[&a, &b]), &["x", "y"]);
    assert_eq!(lookup.result(), Some(Ok(Value::Int(1))));
}

#[test]
fn missing_inner_component_is_not_found() {
    let a = with("x", Value::Frame(empty()));
    let lookup = Lookup::contextual(&context(&[&a]), &["x", "y"]);
    assert_eq!(lookup.result(), Some(not_found("x.y", 1)));
}

#[test]
fn pending_inner_frame_resumes_drill() {
    let inner = pending("y");
    let outer = pending("x");
    let lookup = Lookup::contextual(&context(&[&outer]), &["x", "y"]);

    outer.fulfil("x", Value::Frame(inner.clone())).unwrap();
    assert!(!lookup.is_committed());
    inner.fulfil("y", Value::Unit).unwrap();
    assert_eq!(lookup.result(), Some(Ok(Value::Unit)));
}

// ══════════════════════════════════════════════════════════════════════════════
// Failures
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn no_frame_defines_name() {
    let a = empty();
    let b = with("y", Value::Int(1));
    let lookup = Lookup::contextual(&context(&[&a, &b]), &["x"]);
    assert_eq!(lookup.result(), Some(not_found("x", 2)));
}

#[test]
fn empty_path_rejected_up_front() {
    let a = pending("x");
    let lookup = Lookup::contextual(&context(&[&a]), &[]);
    assert_eq!(lookup.result(), Some(Err(LookupError::EmptyNamePath)));
    assert_eq!(a.pending_subscriptions("x"), 0);
}

#[test]
fn invalid_symbol_rejected_up_front() {
    let a = with("x", Value::Int(1));
    let lookup = Lookup::contextual(&context(&[&a]), &["x", "Bad"]);
    assert!(matches!(
        lookup.result(),
        Some(Err(LookupError::InvalidName { ref name, .. })) if name == "Bad"
    ));
}

// ══════════════════════════════════════════════════════════════════════════════
// Existential Mode
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn existential_true_when_defined() {
    let a = empty();
    let b = with("x", Value::Unit);
    let lookup = Lookup::existential(&context(&[&a, &b]), &["x"]);
    assert_eq!(lookup.mode(), LookupMode::Existential);
    assert_eq!(lookup.result(), Some(Ok(Value::Bool(true))));
}

#[test]
fn existential_false_when_undefined() {
    let a = empty();
    let lookup = Lookup::existential(&context(&[&a]), &["x"]);
    assert_eq!(lookup.result(), Some(Ok(Value::Bool(false))));
}

#[test]
fn existential_waits_for_pending_value() {
    let a = pending("x");
    let lookup = Lookup::existential(&context(&[&a]), &["x"]);
    assert!(!lookup.is_committed());
    a.fulfil("x", Value::Int(0)).unwrap();
    assert_eq!(lookup.result(), Some(Ok(Value::Bool(true))));
}

// ══════════════════════════════════════════════════════════════════════════════
// Coalescing Mode
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn coalescing_skips_null_in_earlier_frame() {
    let a = pending("x");
    let b = pending("x");
    let lookup = Lookup::coalescing(&context(&[&a, &b]), &["x"]);

    b.fulfil("x", Value::Int(2)).unwrap();
    assert!(!lookup.is_committed());
    a.fulfil("x", Value::Unit).unwrap();
    assert_eq!(lookup.result(), Some(Ok(Value::Int(2))));
}

#[test]
fn coalescing_prefers_earlier_non_null() {
    let a = pending("x");
    let b = with("x", Value::Int(2));
    let lookup = Lookup::coalescing(&context(&[&a, &b]), &["x"]);
    a.fulfil("x", Value::Int(1)).unwrap();
    assert_eq!(lookup.result(), Some(Ok(Value::Int(1))));
}

#[test]
fn coalescing_all_null_is_not_found() {
    let a = with("x", Value::Unit);
    let b = with("x", Value::Unit);
    let lookup = Lookup::coalescing(&context(&[&a, &b]), &["x"]);
    assert_eq!(lookup.result(), Some(not_found("x", 2)));
}

#[test]
fn contextual_returns_null_as_value() {
    let a = with("x", Value::Unit);
    let b = with("x", Value::Int(2));
    let lookup = Lookup::contextual(&context(&[&a, &b]), &["x"]);
    assert_eq!(lookup.result(), Some(Ok(Value::Unit)));
}

// ══════════════════════════════════════════════════════════════════════════════
// All Mode
// ══════════════════════════════════════════════════════════════════════════════

fn list_items(result: Option<LookupResult>) -> Vec<(String, Value)> {
    let Some(Ok(Value::Frame(list))) = &result else {
        panic!("expected a list frame, got {result:?}");
    };
    list.names()
        .map(|name| (name.to_string(), list.get(name).unwrap()))
        .collect()
}

#[test]
fn all_collects_in_context_order() {
    let a = pending("x");
    let b = empty();
    let c = pending("x");
    let d = with("x", Value::Int(4));
    let lookup = Lookup::all(&context(&[&a, &b, &c, &d]), &["x"]);

    c.fulfil("x", Value::Int(3)).unwrap();
    assert!(!lookup.is_committed());
    a.fulfil("x", Value::Int(1)).unwrap();

    assert_eq!(
        list_items(lookup.result()),
        vec![
            ("1".to_string(), Value::Int(1)),
            ("2".to_string(), Value::Int(3)),
            ("3".to_string(), Value::Int(4)),
        ]
    );
}

#[test]
fn all_with_no_definitions_is_empty_list() {
    let a = empty();
    let lookup = Lookup::all(&context(&[&a]), &["x"]);
    assert!(list_items(lookup.result()).is_empty());
}

#[test]
fn all_keeps_nulls_and_drills() {
    let a = with("x", Value::Frame(with("y", Value::Unit)));
    let b = with("x", Value::Frame(empty()));
    let c = with("x", Value::Frame(with("y", Value::Int(5))));
    let lookup = Lookup::all(&context(&[&a, &b, &c]), &["x", "y"]);
    let values: Vec<_> = list_items(lookup.result())
        .into_iter()
        .map(|(_, v)| v)
        .collect();
    assert_eq!(values, vec![Value::Unit, Value::Int(5)]);
}

#[test]
fn all_fails_on_non_frame() {
    let a = with("x", Value::Frame(with("y", Value::Int(1))));
    let b = with("x", Value::Bool(true));
    let lookup = Lookup::all(&context(&[&a, &b]), &["x", "y"]);
    assert_eq!(
        lookup.result(),
        Some(Err(LookupError::NotAFrame {
            name: "x.y".into(),
            component: "x".into(),
            found: Type::BOOL,
        }))
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Commit & Release
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn commit_releases_pending_subscriptions() {
    let a = pending("x");
    let b = pending("x");
    let lookup = Lookup::contextual(&context(&[&a, &b]), &["x"]);
    assert_eq!(b.pending_subscriptions("x"), 1);

    a.fulfil("x", Value::Int(1)).unwrap();
    assert!(lookup.is_committed());
    assert_eq!(b.pending_subscriptions("x"), 0);
}

#[test]
fn late_completion_is_ignored() {
    let a = pending("x");
    let b = pending("x");
    let lookup = Lookup::contextual(&context(&[&a, &b]), &["x"]);
    let seen = listen(&lookup);

    a.fulfil("x", Value::Int(1)).unwrap();
    assert_eq!(b.fulfil("x", Value::Int(2)), Ok(0));
    assert_eq!(*seen.borrow(), vec![Ok(Value::Int(1))]);
    assert_eq!(lookup.result(), Some(Ok(Value::Int(1))));
}

#[test]
fn listener_after_commit_runs_immediately() {
    let a = with("x", Value::Int(4));
    let lookup = Lookup::contextual(&context(&[&a]), &["x"]);
    let seen = listen(&lookup);
    assert_eq!(*seen.borrow(), vec![Ok(Value::Int(4))]);
}

#[test]
fn listener_registered_before_start() {
    let a = with("x", Value::Int(4));
    let lookup = Lookup::new(&context(&[&a]), &["x"], LookupMode::Contextual);
    let seen = listen(&lookup);
    assert!(seen.borrow().is_empty());
    lookup.start();
    assert_eq!(seen.borrow().len(), 1);
}

// ══════════════════════════════════════════════════════════════════════════════
// Attempt Grid
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn frame_at_records_each_attempt() {
    let inner = with("y", Value::Int(1));
    let a = empty();
    let b = with("x", Value::Frame(inner.clone()));
    let lookup = Lookup::contextual(&context(&[&a, &b]), &["x", "y"]);

    assert!(Rc::ptr_eq(&lookup.frame_at(0, 0).unwrap(), &a));
    assert!(Rc::ptr_eq(&lookup.frame_at(0, 1).unwrap(), &b));
    assert!(Rc::ptr_eq(&lookup.frame_at(1, 1).unwrap(), &inner));
    assert!(lookup.frame_at(1, 0).is_none());
    assert!(Rc::ptr_eq(&lookup.last_frame().unwrap(), &inner));
    assert_eq!(lookup.last_name().as_deref(), Some("y"));
    assert_eq!(lookup.name(), "x.y");
    assert_eq!(lookup.frame_count(), 2);
}

// ══════════════════════════════════════════════════════════════════════════════
// Reordered Completion
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
enum Shape {
    Missing,
    Scalar(i64),
    Nested(Option<i64>),
}

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

/// Result of searching `a.b` frame by frame over fully produced frames.
fn sequential(shapes: &[Shape]) -> LookupResult {
    for shape in shapes {
        if let Shape::Nested(Some(v)) = shape {
            return Ok(Value::Int(*v));
        }
    }
    if shapes.iter().any(|s| matches!(s, Shape::Scalar(_))) {
        return Err(LookupError::NotAFrame {
            name: "a.b".into(),
            component: "a".into(),
            found: Type::INT,
        });
    }
    not_found("a.b", shapes.len())
}

/// Values collected for `a.b` from every fully produced frame.
fn sequential_all(shapes: &[Shape]) -> Result<Vec<Value>, LookupError> {
    if shapes.iter().any(|s| matches!(s, Shape::Scalar(_))) {
        return Err(LookupError::NotAFrame {
            name: "a.b".into(),
            component: "a".into(),
            found: Type::INT,
        });
    }
    Ok(shapes
        .iter()
        .filter_map(|s| match s {
            Shape::Nested(Some(v)) => Some(Value::Int(*v)),
            _ => None,
        })
        .collect())
}

/// The values of a committed list result, in key order.
fn collected(result: Option<LookupResult>) -> Result<Vec<Value>, LookupError> {
    match result {
        Some(Err(err)) => Err(err),
        other => Ok(list_items(other).into_iter().map(|(_, v)| v).collect()),
    }
}

#[test]
fn reordered_completion_matches_sequential_100_iterations() {
    let mut rng = Lcg(0x5eed);
    for _ in 0..100 {
        let count = 1 + rng.below(5);
        let shapes: Vec<Shape> = (0..count)
            .map(|i| match rng.below(4) {
                0 => Shape::Missing,
                1 => Shape::Scalar(i as i64),
                2 => Shape::Nested(None),
                _ => Shape::Nested(Some(100 + i as i64)),
            })
            .collect();

        let mut frames = Vec::new();
        let mut productions: Vec<(Rc<Frame>, &str, Value)> = Vec::new();
        for shape in &shapes {
            match shape {
                Shape::Missing => frames.push(empty()),
                Shape::Scalar(v) => {
                    let frame = pending("a");
                    productions.push((frame.clone(), "a", Value::Int(*v)));
                    frames.push(frame);
                }
                Shape::Nested(inner_value) => {
                    let inner = match inner_value {
                        Some(v) => {
                            let inner = pending("b");
                            productions.push((inner.clone(), "b", Value::Int(*v)));
                            inner
                        }
                        None => empty(),
                    };
                    let frame = pending("a");
                    productions.push((frame.clone(), "a", Value::Frame(inner)));
                    frames.push(frame);
                }
            }
        }
        for i in (1..productions.len()).rev() {
            let j = rng.below(i + 1);
            productions.swap(i, j);
        }

        let ctx = Context::from_frames(frames.clone());
        let lookup = Lookup::contextual(&ctx, &["a", "b"]);
        let every = Lookup::all(&ctx, &["a", "b"]);
        for (frame, name, value) in productions {
            frame.fulfil(name, value).unwrap();
        }

        assert_eq!(lookup.result(), Some(sequential(&shapes)), "shapes: {shapes:?}");
        assert_eq!(collected(every.result()), sequential_all(&shapes), "shapes: {shapes:?}");
        for frame in &frames {
            assert_eq!(frame.pending_subscriptions("a"), 0);
        }
    }
}
