use std::fmt;

/// Slush: remembers the choice of the last successful poll, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler<T> {
    preference: T,
}

impl<T: Copy> Sampler<T> {
    #[must_use]
    pub const fn new(choice: T) -> Self {
        Self { preference: choice }
    }

    #[must_use]
    pub fn preference(&self) -> T {
        self.preference
    }

    pub fn record_successful_poll(&mut self, choice: T) {
        self.preference = choice;
    }
}

impl<T: fmt::Display> fmt::Display for Sampler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SL(Preference = {})", self.preference)
    }
}
