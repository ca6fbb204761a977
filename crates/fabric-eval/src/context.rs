//! Contexts: the ordered frame stack a lookup searches.

use std::rc::Rc;

use crate::frame::Frame;

struct Link {
    frame: Rc<Frame>,
    next: Option<Rc<Link>>,
}

/// An immutable, shareable list of frames, innermost first.
///
/// Prepending shares the tail with the original context.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Rc<Link>>,
    len: usize,
}

impl Context {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a context whose enumeration order is `frames`' order.
    pub fn from_frames(frames: impl IntoIterator<Item = Rc<Frame>>) -> Self {
        let frames: Vec<_> = frames.into_iter().collect();
        frames
            .into_iter()
            .rev()
            .fold(Self::empty(), |context, frame| context.prepend(frame))
    }

    /// A context that searches `frame` before every frame of this one.
    pub fn prepend(&self, frame: Rc<Frame>) -> Self {
        Self {
            head: Some(Rc::new(Link {
                frame,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// A context that searches `frame` after every frame of this one.
    pub fn append(&self, frame: Rc<Frame>) -> Self {
        Self::from_frames(self.frames().chain(std::iter::once(frame)))
    }

    /// Frames in search order.
    pub fn frames(&self) -> impl Iterator<Item = Rc<Frame>> + '_ {
        std::iter::successors(self.head.as_deref(), |link| link.next.as_deref())
            .map(|link| link.frame.clone())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameBuilder;

    #[test]
    fn test_prepend_and_append_order() {
        let a = FrameBuilder::new().build();
        let b = FrameBuilder::new().build();
        let c = FrameBuilder::new().build();
        let context = Context::empty()
            .prepend(b.clone())
            .prepend(a.clone())
            .append(c.clone());
        let order: Vec<_> = context.frames().collect();
        assert_eq!(context.len(), 3);
        assert!(Rc::ptr_eq(&order[0], &a));
        assert!(Rc::ptr_eq(&order[1], &b));
        assert!(Rc::ptr_eq(&order[2], &c));
    }

    #[test]
    fn test_prepend_leaves_original_untouched() {
        let base = Context::from_frames([FrameBuilder::new().build()]);
        let extended = base.prepend(FrameBuilder::new().build());
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        assert!(Context::empty().is_empty());
    }
}
