use std::cell::RefCell;

use rustc_hash::FxHashSet;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    /// Don't show any diagnostics.
    Off,
    /// Report only analyses which lost precision.
    Warn,
    /// Report all analyses.
    Info,
}

impl DiagnosticLevel {
    /// Parse a level name such as "warn", as used in the
    /// `RTEN_SHAPE_DIAGNOSTICS` environment variable.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "off" | "0" => Some(Self::Off),
            "warn" => Some(Self::Warn),
            "info" | "1" => Some(Self::Info),
            _ => None,
        }
    }
}

/// Diagnostic reporter for shape analysis.
///
/// Messages are attributed to a subject, usually the name of the node being
/// analyzed.
pub struct Diagnostics {
    /// Subjects against which diagnostics have been reported at the `Warn`
    /// level or higher.
    warned: RefCell<FxHashSet<String>>,
    level: DiagnosticLevel,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            warned: RefCell::new(FxHashSet::default()),
            level: DiagnosticLevel::Off,
        }
    }

    /// Enable reporting of all messages at or above a given level.
    pub fn set_level(&mut self, level: DiagnosticLevel) {
        self.level = level;
    }

    /// Return true if diagnostic messages are enabled at a given level.
    pub fn enabled(&self, level: DiagnosticLevel) -> bool {
        self.level >= level
    }

    /// Log a message at the [`Info`](DiagnosticLevel::Info) level.
    pub fn info(&self, subject: &str, message: std::fmt::Arguments<'_>) {
        if self.level < DiagnosticLevel::Info {
            return;
        }
        self.log(DiagnosticLevel::Info, subject, message);
    }

    /// Log a message at the [`Warn`](DiagnosticLevel::Warn) level.
    ///
    /// Only the first warning for each subject is reported.
    pub fn warn(&self, subject: &str, message: std::fmt::Arguments<'_>) {
        if self.level < DiagnosticLevel::Warn || self.warned.borrow().contains(subject) {
            return;
        }
        self.warned.borrow_mut().insert(subject.to_string());
        self.log(DiagnosticLevel::Warn, subject, message);
    }

    fn log(&self, level: DiagnosticLevel, subject: &str, message: std::fmt::Arguments<'_>) {
        let level_char = match level {
            DiagnosticLevel::Warn => 'W',
            DiagnosticLevel::Info => 'I',
            DiagnosticLevel::Off => unreachable!(),
        };
        println!("{}| {}: {}", level_char, subject, message);
    }
}
