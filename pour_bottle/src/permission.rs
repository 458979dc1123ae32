//! Terminal-backed motion permission, for hosts that want an explicit
//! consent step before sensors start.

use std::io::{self, BufRead, Write};

use log::debug;
use tilt_motion::{MotionAccess, MotionPermission};

/// Asks on a terminal; anything but `y`/`yes` is a denial.  A closed input
/// stream means nobody can answer, which counts as `Unavailable`.
pub struct PromptPermission<R, W> {
    input:  R,
    output: W,
}

impl PromptPermission<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        PromptPermission { input: io::stdin().lock(), output: io::stdout() }
    }
}

impl<R: BufRead, W: Write> PromptPermission<R, W> {
    pub fn new(input: R, output: W) -> Self {
        PromptPermission { input, output }
    }

    fn ask(&mut self, question: &str) -> Option<bool> {
        write!(self.output, "  {} [y/N]: ", question).ok();
        self.output.flush().ok();
        let mut buf = String::new();
        match self.input.read_line(&mut buf) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let answer = buf.trim().to_ascii_lowercase();
                Some(answer == "y" || answer == "yes")
            }
        }
    }
}

impl<R: BufRead, W: Write> MotionPermission for PromptPermission<R, W> {
    fn request_motion_access(&mut self) -> MotionAccess {
        match self.ask("Allow access to motion sensors?") {
            Some(true)  => MotionAccess::Granted,
            Some(false) => MotionAccess::Denied,
            None        => MotionAccess::Unavailable,
        }
    }

    fn request_orientation_access(&mut self) {
        let answer = self.ask("Allow access to device orientation?");
        debug!("orientation access answer: {:?} (ignored)", answer);
    }
}
