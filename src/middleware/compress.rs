//! Response compression binding point.
//!
//! Brotli encoding needs a native encoder binding; builds without one get
//! this passthrough, so pipelines can register compression unconditionally
//! and pick up the real encoder when it is linked in.

use crate::chain::Middleware;
use crate::handler::SharedHandler;

/// Brotli middleware slot (passthrough).
pub fn br() -> Noop {
    Noop
}

/// Same slot with an explicit quality; the parameter only matters to a real
/// encoder.
pub fn br_with_quality(_quality: u32) -> Noop {
    br()
}

/// Identity middleware.
pub struct Noop;

impl Middleware for Noop {
    fn wrap(&self, next: SharedHandler) -> SharedHandler {
        next
    }
}
