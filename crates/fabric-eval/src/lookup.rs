//! Asynchronous contextual lookup.
//!
//! A lookup for `a.b.c` searches the frames of a [`Context`] in order. Every
//! frame is attempted at once: a frame either answers component `a`
//! immediately, parks the attempt until it produces `a`, or does not define
//! it. Each answer is drilled into for the next component the same way.
//!
//! Answers can arrive in any order, so each frame index carries an
//! [`Outcome`] and the lookup only commits once every frame before the
//! winner has failed:
//!
//! ```text
//! frame:    0          1          2
//! outcome:  NotFound   Pending    Found(7)    → wait for frame 1
//!           NotFound   Found(3)   Found(7)    → commit 3
//! ```
//!
//! The result is therefore the one a frame-by-frame search would produce
//! once every frame involved is fully produced.
//!
//! [`LookupMode`] picks what is reported: the first value, whether one
//! exists, the first non-Null value, or every value in context order.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use fabric_types::Type;
use unicode_general_category::{get_general_category, GeneralCategory};

use crate::context::Context;
use crate::error::{LookupError, LookupResult};
use crate::frame::{Availability, Frame, FrameBuilder, SubscriptionId};
use crate::value::Value;

/// What a lookup reports once the path resolves or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// The value at the end of the path.
    Contextual,
    /// `Bool(true)` if some frame supplies the path, `Bool(false)` if none
    /// defines it.
    Existential,
    /// Like `Contextual`, but a Null at the end of the path counts as absent
    /// and the search moves on to the next frame.
    Coalescing,
    /// Every frame's value, in context order, as a list frame keyed `1`,
    /// `2`, ... Frames that do not define the path contribute nothing.
    All,
}

#[derive(Debug, Clone)]
enum Outcome {
    Pending,
    Found(Value),
    NotFound,
    NotAFrame { component: usize, found: Type },
}

struct Attempt {
    frame_index: usize,
    name_index: usize,
    frame: Rc<Frame>,
}

struct Subscription {
    frame: Rc<Frame>,
    name: String,
    id: SubscriptionId,
}

type Listener = Box<dyn FnOnce(&LookupResult)>;

struct LookupState {
    names: Vec<String>,
    frames: Vec<Rc<Frame>>,
    mode: LookupMode,
    started: bool,
    attempts: Vec<Attempt>,
    outcomes: Vec<Outcome>,
    // At most one in-flight attempt per frame index.
    subscriptions: Vec<Option<Subscription>>,
    result: Option<LookupResult>,
    listeners: Vec<Listener>,
}

impl LookupState {
    fn dotted(&self) -> String {
        self.names.join(".")
    }

    fn decide(&self) -> Option<LookupResult> {
        if self.mode == LookupMode::All {
            return self.collect_all();
        }
        let mut not_a_frame = None;
        for outcome in &self.outcomes {
            match outcome {
                Outcome::Pending => return None,
                Outcome::Found(Value::Unit) if self.mode == LookupMode::Coalescing => {}
                Outcome::Found(value) => {
                    return Some(Ok(match self.mode {
                        LookupMode::Existential => Value::Bool(true),
                        _ => value.clone(),
                    }))
                }
                Outcome::NotFound => {}
                Outcome::NotAFrame { component, found } => {
                    not_a_frame.get_or_insert((*component, *found));
                }
            }
        }
        Some(match not_a_frame {
            Some((component, found)) => Err(LookupError::NotAFrame {
                name: self.dotted(),
                component: self.names[..=component].join("."),
                found,
            }),
            None if self.mode == LookupMode::Existential => Ok(Value::Bool(false)),
            None => Err(LookupError::NameNotFound {
                name: self.dotted(),
                frames: self.frames.len(),
            }),
        })
    }

    /// Waits for every frame. A non-frame met while drilling fails the whole
    /// lookup.
    fn collect_all(&self) -> Option<LookupResult> {
        let mut list = FrameBuilder::new();
        let mut count = 0usize;
        for outcome in &self.outcomes {
            match outcome {
                Outcome::Pending => return None,
                Outcome::Found(value) => {
                    count += 1;
                    list = list.ready(&count.to_string(), value.clone());
                }
                Outcome::NotFound => {}
                Outcome::NotAFrame { component, found } => {
                    return Some(Err(LookupError::NotAFrame {
                        name: self.dotted(),
                        component: self.names[..=*component].join("."),
                        found: *found,
                    }))
                }
            }
        }
        Some(Ok(Value::Frame(list.build())))
    }
}

/// Check one lookup component.
///
/// The first character must be a lowercase or other letter (general
/// categories Ll and Lo). The rest may be letters other than modifier
/// letters, decimal digits, letter or other numbers, or `_`.
pub fn verify_symbol(name: &str) -> Result<(), LookupError> {
    use GeneralCategory::*;

    let invalid = |reason: String| LookupError::InvalidName {
        name: name.to_string(),
        reason,
    };
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("name is empty".into())),
        Some(c) if !matches!(get_general_category(c), LowercaseLetter | OtherLetter) => {
            return Err(invalid(format!("cannot start with “{c}”")));
        }
        Some(_) => {}
    }
    let bad = chars.find(|&c| {
        c != '_'
            && !matches!(
                get_general_category(c),
                DecimalNumber
                    | LetterNumber
                    | LowercaseLetter
                    | OtherLetter
                    | OtherNumber
                    | TitlecaseLetter
                    | UppercaseLetter
            )
    });
    match bad {
        Some(c) => Err(invalid(format!("“{c}” is not a letter, digit or underscore"))),
        None => Ok(()),
    }
}

/// A handle to one lookup. Clones share the same lookup.
#[derive(Clone)]
pub struct Lookup {
    state: Rc<RefCell<LookupState>>,
}

impl Lookup {
    /// Prepare a lookup over a snapshot of `context`. Nothing is attempted
    /// until [`start`](Self::start).
    pub fn new(context: &Context, names: &[&str], mode: LookupMode) -> Self {
        let frames: Vec<_> = context.frames().collect();
        let count = frames.len();
        Self {
            state: Rc::new(RefCell::new(LookupState {
                names: names.iter().map(|n| n.to_string()).collect(),
                frames,
                mode,
                started: false,
                attempts: Vec::new(),
                outcomes: vec![Outcome::Pending; count],
                subscriptions: (0..count).map(|_| None).collect(),
                result: None,
                listeners: Vec::new(),
            })),
        }
    }

    /// Start a contextual lookup.
    pub fn contextual(context: &Context, names: &[&str]) -> Self {
        let lookup = Self::new(context, names, LookupMode::Contextual);
        lookup.start();
        lookup
    }

    /// Start an existential lookup.
    pub fn existential(context: &Context, names: &[&str]) -> Self {
        let lookup = Self::new(context, names, LookupMode::Existential);
        lookup.start();
        lookup
    }

    /// Start a lookup that skips Null values.
    pub fn coalescing(context: &Context, names: &[&str]) -> Self {
        let lookup = Self::new(context, names, LookupMode::Coalescing);
        lookup.start();
        lookup
    }

    /// Start a lookup that collects every frame's value.
    pub fn all(context: &Context, names: &[&str]) -> Self {
        let lookup = Self::new(context, names, LookupMode::All);
        lookup.start();
        lookup
    }

    /// Attempt every frame. Calling this again does nothing.
    pub fn start(&self) {
        let validation = {
            let mut st = self.state.borrow_mut();
            if st.started {
                return;
            }
            st.started = true;
            if st.names.is_empty() {
                Err(LookupError::EmptyNamePath)
            } else {
                st.names.iter().try_for_each(|n| verify_symbol(n))
            }
        };
        if let Err(err) = validation {
            self.commit(Err(err));
            return;
        }
        let count = self.state.borrow().frames.len();
        for frame_index in 0..count {
            if self.is_committed() {
                return;
            }
            let frame = self.state.borrow().frames[frame_index].clone();
            self.attempt(frame_index, 0, frame);
        }
        self.settle();
    }

    fn attempt(&self, frame_index: usize, name_index: usize, frame: Rc<Frame>) {
        let name = {
            let mut st = self.state.borrow_mut();
            st.attempts.push(Attempt {
                frame_index,
                name_index,
                frame: frame.clone(),
            });
            st.names[name_index].clone()
        };
        let this = self.clone();
        let availability = frame.get_or_subscribe(&name, move |value| {
            this.receive(frame_index, name_index, value)
        });
        match availability {
            Availability::Absent => self.record(frame_index, Outcome::NotFound),
            Availability::Delivered => {}
            Availability::Subscribed(id) => {
                self.state.borrow_mut().subscriptions[frame_index] =
                    Some(Subscription { frame, name, id });
            }
        }
    }

    fn receive(&self, frame_index: usize, name_index: usize, value: Value) {
        let last = {
            let mut st = self.state.borrow_mut();
            if st.result.is_some() {
                return;
            }
            st.subscriptions[frame_index] = None;
            name_index + 1 == st.names.len()
        };
        if last {
            self.record(frame_index, Outcome::Found(value));
            return;
        }
        match value.as_frame() {
            Some(frame) => self.attempt(frame_index, name_index + 1, frame.clone()),
            None => self.record(
                frame_index,
                Outcome::NotAFrame {
                    component: name_index,
                    found: value.type_of(),
                },
            ),
        }
    }

    fn record(&self, frame_index: usize, outcome: Outcome) {
        self.state.borrow_mut().outcomes[frame_index] = outcome;
        self.settle();
    }

    fn settle(&self) {
        let decision = {
            let st = self.state.borrow();
            if st.result.is_some() {
                return;
            }
            st.decide()
        };
        if let Some(result) = decision {
            self.commit(result);
        }
    }

    fn commit(&self, result: LookupResult) {
        let (subscriptions, listeners, name) = {
            let mut st = self.state.borrow_mut();
            st.result = Some(result.clone());
            let subscriptions: Vec<_> = st
                .subscriptions
                .iter_mut()
                .filter_map(Option::take)
                .collect();
            (subscriptions, std::mem::take(&mut st.listeners), st.dotted())
        };
        tracing::debug!(
            name = %name,
            ok = result.is_ok(),
            released = subscriptions.len(),
            "lookup committed"
        );
        for sub in subscriptions {
            sub.frame.unsubscribe(&sub.name, sub.id);
        }
        for listener in listeners {
            listener(&result);
        }
    }

    /// Run `listener` with the result, now if the lookup has committed.
    pub fn notify(&self, listener: impl FnOnce(&LookupResult) + 'static) {
        let committed = self.state.borrow().result.clone();
        match committed {
            Some(result) => listener(&result),
            None => self.state.borrow_mut().listeners.push(Box::new(listener)),
        }
    }

    pub fn result(&self) -> Option<LookupResult> {
        self.state.borrow().result.clone()
    }

    pub fn is_committed(&self) -> bool {
        self.state.borrow().result.is_some()
    }

    pub fn mode(&self) -> LookupMode {
        self.state.borrow().mode
    }

    /// The dotted path being looked up.
    pub fn name(&self) -> String {
        self.state.borrow().dotted()
    }

    pub fn frame_count(&self) -> usize {
        self.state.borrow().frames.len()
    }

    /// The frame asked for component `name_index` on behalf of context frame
    /// `frame_index`, if that attempt was made.
    pub fn frame_at(&self, name_index: usize, frame_index: usize) -> Option<Rc<Frame>> {
        self.state
            .borrow()
            .attempts
            .iter()
            .find(|a| a.frame_index == frame_index && a.name_index == name_index)
            .map(|a| a.frame.clone())
    }

    /// Frame of the most recent attempt.
    pub fn last_frame(&self) -> Option<Rc<Frame>> {
        self.state.borrow().attempts.last().map(|a| a.frame.clone())
    }

    /// Component of the most recent attempt.
    pub fn last_name(&self) -> Option<String> {
        let st = self.state.borrow();
        st.attempts.last().map(|a| st.names[a.name_index].clone())
    }
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("Lookup")
            .field("name", &st.dotted())
            .field("mode", &st.mode)
            .field("result", &st.result)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameBuilder;

    #[test]
    fn test_verify_symbol() {
        assert!(verify_symbol("x").is_ok());
        assert!(verify_symbol("snake_case_2").is_ok());
        assert!(verify_symbol("élan").is_ok());
        assert!(verify_symbol("Upper").is_err());
        assert!(verify_symbol("2x").is_err());
        assert!(verify_symbol("中文").is_ok());
        assert!(verify_symbol("xǅ").is_ok());
        // titlecase, modifier letter and letter number starts
        assert!(verify_symbol("ǅx").is_err());
        assert!(verify_symbol("ʰx").is_err());
        assert!(verify_symbol("ⅻx").is_err());
        assert!(verify_symbol("xʰ").is_err());
        assert!(verify_symbol("a-b").is_err());
        assert!(verify_symbol("").is_err());
    }

    #[test]
    fn test_ready_value_commits_during_start() {
        let frame = FrameBuilder::new().ready("x", Value::Int(1)).build();
        let lookup = Lookup::contextual(&Context::from_frames([frame]), &["x"]);
        assert_eq!(lookup.result(), Some(Ok(Value::Int(1))));
    }

    #[test]
    fn test_empty_context_is_not_found() {
        let lookup = Lookup::contextual(&Context::empty(), &["x"]);
        assert_eq!(
            lookup.result(),
            Some(Err(LookupError::NameNotFound {
                name: "x".into(),
                frames: 0
            }))
        );
    }

    #[test]
    fn test_start_is_idempotent() {
        let frame = FrameBuilder::new().pending("x").build();
        let lookup = Lookup::new(
            &Context::from_frames([frame.clone()]),
            &["x"],
            LookupMode::Contextual,
        );
        lookup.start();
        lookup.start();
        assert_eq!(frame.pending_subscriptions("x"), 1);
    }
}
