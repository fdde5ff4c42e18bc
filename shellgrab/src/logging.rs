//! Logging configuration passed to session components.
//!
//! There is no process-wide verbosity switch. Each component receives a
//! [`Verbosity`] when it is built and uses it to pick the level of its
//! per-host progress messages. The `log` facade still routes everything to
//! whichever logger the binary installed.

use log::Level;

/// Controls how loudly per-host progress is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verbosity {
    verbose: bool,
}

impl Verbosity {
    /// Create a verbosity setting.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Progress messages at `info` level.
    pub fn verbose() -> Self {
        Self::new(true)
    }

    /// Progress messages at `debug` level.
    pub fn quiet() -> Self {
        Self::new(false)
    }

    /// Level used for progress messages.
    pub fn progress_level(&self) -> Level {
        if self.verbose { Level::Info } else { Level::Debug }
    }

    /// Emit a progress message for `host`.
    pub fn progress(&self, host: &str, message: impl std::fmt::Display) {
        log::log!(self.progress_level(), "[{}] {}", host, message);
    }

    /// Default `env_logger` filter for this verbosity.
    ///
    /// `russh` is held at `warn` because its `info` output is per-packet noise.
    pub fn default_filter(&self) -> &'static str {
        if self.verbose { "info,russh=warn" } else { "warn" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_level() {
        assert_eq!(Verbosity::verbose().progress_level(), Level::Info);
        assert_eq!(Verbosity::quiet().progress_level(), Level::Debug);
        assert_eq!(Verbosity::default(), Verbosity::quiet());
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(Verbosity::quiet().default_filter(), "warn");
        assert!(Verbosity::verbose().default_filter().starts_with("info"));
    }
}
