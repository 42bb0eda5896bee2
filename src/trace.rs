//! Debug tracing gated by a verbosity level: a message is built and printed
//! only when the active level is high enough, so release builds pay nothing
//! beyond the level check.

use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent,
    Decision,
    Closure,
    Full,
}

#[derive(Debug, Clone, Copy)]
pub struct Log<T> {
    pub level: Verbosity,
    pub marker: std::marker::PhantomData<T>,
}

impl<T> Log<T> {
    pub fn new(level: Verbosity) -> Self {
        Self { level, marker: std::marker::PhantomData }
    }

    #[cfg(debug_assertions)]
    pub fn trace(&self, at: Verbosity, make_message: impl FnOnce() -> String) {
        if at <= self.level {
            println!("[{:?}] {}", at, make_message());
        }
    }

    #[cfg(not(debug_assertions))]
    pub fn trace(&self, _at: Verbosity, _make_message: impl FnOnce() -> String) {}
}

impl<T> Default for Log<T> {
    fn default() -> Self {
        Self::new(Verbosity::Silent)
    }
}

/// Formats an alt set/config count the way closure tracing wants to print
/// it, without requiring every caller to build a `Vec` first.
pub fn joined<T: Display>(items: impl IntoIterator<Item = T>) -> String {
    items.into_iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}
