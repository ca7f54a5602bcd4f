// ABOUTME: Diagnostics accumulator for non-fatal warnings raised during an update session.
// ABOUTME: Collects problems that shouldn't fail a session but should reach the log and the caller.

/// Warnings raised while a session or a reap pass runs. Each one is logged when
/// recorded; callers read them back to fold into their own error reporting.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// An old image could not be removed after its containers were replaced.
    pub fn image_cleanup(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ImageCleanup,
            message: message.into(),
        }
    }

    /// An excess watchtower instance could not be stopped.
    pub fn instance_stop(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::InstanceStop,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    ImageCleanup,
    InstanceStop,
}
