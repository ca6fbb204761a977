//! Fabric runtime core.
//!
//! Frames produce each attribute once, possibly later than it is asked
//! for. A [`Context`] orders frames innermost first, and a [`Lookup`]
//! resolves a dotted path against it without blocking: attempts park on
//! frames and resume by callback, while the lookup's arbitration keeps the
//! result equal to a frame-by-frame search.

pub mod context;
pub mod error;
pub mod frame;
pub mod lookup;
pub mod value;

pub use context::Context;
pub use error::{FrameError, LookupError, LookupResult};
pub use frame::{Availability, Frame, FrameBuilder, SubscriptionId};
pub use lookup::{verify_symbol, Lookup, LookupMode};
pub use value::{Template, Value};
