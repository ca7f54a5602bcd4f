// ABOUTME: Label keys recognised on containers, all under one namespace.
// ABOUTME: Lifecycle keys are derived per phase.

pub const WATCHTOWER: &str = "com.centurylinklabs.watchtower";
pub const ENABLE: &str = "com.centurylinklabs.watchtower.enable";
pub const MONITOR_ONLY: &str = "com.centurylinklabs.watchtower.monitor-only";
pub const NO_PULL: &str = "com.centurylinklabs.watchtower.no-pull";
pub const DEPENDS_ON: &str = "com.centurylinklabs.watchtower.depends-on";
pub const SCOPE: &str = "com.centurylinklabs.watchtower.scope";
pub const STOP_SIGNAL: &str = "com.centurylinklabs.watchtower.stop-signal";

/// Original image of containers deployed through zodiac.
pub const ZODIAC_ORIGINAL_IMAGE: &str = "com.centurylinklabs.zodiac.original-image";

/// `com.centurylinklabs.watchtower.lifecycle.<phase>`
pub fn lifecycle_command(phase: &str) -> String {
    format!("{}.lifecycle.{}", WATCHTOWER, phase)
}

/// `com.centurylinklabs.watchtower.lifecycle.<phase>-timeout`
pub fn lifecycle_timeout(phase: &str) -> String {
    format!("{}.lifecycle.{}-timeout", WATCHTOWER, phase)
}

/// True when the labels mark a watchtower instance.
pub fn contains_watchtower_label<'a, I>(labels: I) -> bool
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    labels
        .into_iter()
        .any(|(k, v)| k == WATCHTOWER && v == "true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_keys() {
        assert_eq!(
            lifecycle_command("pre-update"),
            "com.centurylinklabs.watchtower.lifecycle.pre-update"
        );
        assert_eq!(
            lifecycle_timeout("post-check"),
            "com.centurylinklabs.watchtower.lifecycle.post-check-timeout"
        );
    }
}
