//! Motion-sensor access negotiation.
//!
//! Some platforms only hand out motion data after the user explicitly grants
//! it in response to a gesture; others have no gate at all.  Each target
//! implements [`MotionPermission`]; callers only look at [`MotionAccess`].

/// Result of asking for motion-sensor access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionAccess {
    Granted,
    Denied,
    /// The platform has no permission gate.
    Unavailable,
}

impl MotionAccess {
    /// Whether sensor listening may begin.  `Unavailable` proceeds so that
    /// ungated desktops and test rigs keep working.
    pub fn may_proceed(self) -> bool {
        !matches!(self, MotionAccess::Denied)
    }
}

/// Platform capability check for motion sensors.
///
/// Both calls must be made in direct response to a user action.
pub trait MotionPermission {
    fn request_motion_access(&mut self) -> MotionAccess;

    /// Best-effort request for orientation data.  The outcome is ignored.
    fn request_orientation_access(&mut self) {}
}

/// A platform without any gate.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ungated;

impl MotionPermission for Ungated {
    fn request_motion_access(&mut self) -> MotionAccess { MotionAccess::Unavailable }
}

/// A fixed answer; handy for tests and scripted runs.
#[derive(Clone, Copy, Debug)]
pub struct FixedAccess(pub MotionAccess);

impl MotionPermission for FixedAccess {
    fn request_motion_access(&mut self) -> MotionAccess { self.0 }
}
