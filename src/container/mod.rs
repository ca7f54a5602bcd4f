// ABOUTME: The immutable Container value built from engine inspect results.
// ABOUTME: Derives labels, dependency links, stop signal and the create request for a replacement.

mod create_config;
pub mod labels;

pub use create_config::{create_config, create_host_config};
pub(crate) use create_config::{is_container_network, is_host_network};

use crate::filters::FilterableContainer;
use crate::lifecycle::Phase;
use crate::runtime::{
    ContainerDetails, CreateContainerRequest, EndpointSettings, HostConfig, ImageDetails,
};
use crate::types::{ContainerId, ImageId};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Lifecycle timeout applied when the label is absent or unparseable.
pub const DEFAULT_LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Signal sent to stop a container that has no stop-signal label.
pub const DEFAULT_STOP_SIGNAL: &str = "SIGTERM";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no available image info")]
    NoImageInfo,

    #[error("container configuration missing or invalid: {0}")]
    InvalidConfig(String),
}

/// A container as reported by the engine, plus its image when it could be inspected.
///
/// Values are never mutated after construction. Per-session state such as
/// staleness is tracked by the update engine alongside, keyed by id.
#[derive(Debug, Clone)]
pub struct Container {
    details: ContainerDetails,
    image: Option<ImageDetails>,
}

impl Container {
    pub fn new(details: ContainerDetails, image: Option<ImageDetails>) -> Self {
        Self { details, image }
    }

    pub fn id(&self) -> &ContainerId {
        &self.details.id
    }

    /// Name with the leading `/` the engine reports.
    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn is_running(&self) -> bool {
        self.details.state.running
    }

    pub fn is_restarting(&self) -> bool {
        self.details.state.restarting
    }

    pub fn image_id(&self) -> &ImageId {
        &self.details.image
    }

    /// Image reference to pull, defaulting the tag to `latest`.
    ///
    /// Containers deployed through zodiac carry their original reference in a label.
    pub fn image_name(&self) -> String {
        let name = self
            .label(labels::ZODIAC_ORIGINAL_IMAGE)
            .unwrap_or(&self.details.config.image);
        let last_segment = name.rsplit('/').next().unwrap_or(name);
        if last_segment.contains(':') || last_segment.contains('@') {
            name.to_string()
        } else {
            format!("{}:latest", name)
        }
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.details.config.labels
    }

    fn label(&self, key: &str) -> Option<&str> {
        self.details.config.labels.get(key).map(String::as_str)
    }

    /// Value of the enable label. `None` when missing or not a boolean.
    pub fn enabled(&self) -> Option<bool> {
        self.label(labels::ENABLE).and_then(parse_bool)
    }

    pub fn monitor_only(&self, global: bool, label_precedence: bool) -> bool {
        self.container_or_global_bool(labels::MONITOR_ONLY, global, label_precedence)
    }

    pub fn no_pull(&self, global: bool, label_precedence: bool) -> bool {
        self.container_or_global_bool(labels::NO_PULL, global, label_precedence)
    }

    fn container_or_global_bool(&self, key: &str, global: bool, label_precedence: bool) -> bool {
        let Some(raw) = self.label(key) else {
            return global;
        };
        match parse_bool(raw) {
            Some(value) if label_precedence => value,
            Some(value) => value || global,
            None => {
                tracing::warn!(container = %self.name(), label = key, value = raw, "Unable to parse label value");
                global
            }
        }
    }

    /// Scope label, if any.
    pub fn scope(&self) -> Option<&str> {
        self.label(labels::SCOPE)
    }

    /// Names (with leading `/`) of the containers this one depends on.
    ///
    /// The depends-on label replaces engine links entirely. A `container:`
    /// network mode counts as an implicit link.
    pub fn links(&self) -> Vec<String> {
        if let Some(depends_on) = self.label(labels::DEPENDS_ON).filter(|v| !v.trim().is_empty()) {
            return depends_on
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(with_slash)
                .collect();
        }

        let host_config = &self.details.host_config;
        let mut links: Vec<String> = host_config
            .links
            .iter()
            .flatten()
            .map(|link| with_slash(link.split(':').next().unwrap_or(link)))
            .collect();

        if let Some(provider) = host_config
            .network_mode
            .as_deref()
            .and_then(|mode| mode.strip_prefix("container:"))
        {
            links.push(with_slash(provider));
        }
        links
    }

    pub fn is_watchtower(&self) -> bool {
        labels::contains_watchtower_label(self.labels())
    }

    pub fn stop_signal(&self) -> &str {
        self.label(labels::STOP_SIGNAL)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STOP_SIGNAL)
    }

    /// Command configured for a lifecycle phase. Empty commands count as absent.
    pub fn lifecycle_command(&self, phase: Phase) -> Option<&str> {
        self.details
            .config
            .labels
            .get(&labels::lifecycle_command(phase.as_str()))
            .map(String::as_str)
            .filter(|cmd| !cmd.trim().is_empty())
    }

    /// Timeout for a lifecycle phase. A plain integer counts minutes; `None`
    /// means the command may run until it exits.
    pub fn lifecycle_timeout(&self, phase: Phase) -> Option<Duration> {
        let key = labels::lifecycle_timeout(phase.as_str());
        let Some(raw) = self.details.config.labels.get(&key) else {
            return Some(DEFAULT_LIFECYCLE_TIMEOUT);
        };
        let raw = raw.trim();
        let parsed = match raw.parse::<u64>() {
            Ok(minutes) => minutes
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| "value is out of range".to_string()),
            Err(_) => humantime::parse_duration(raw).map_err(|e| e.to_string()),
        };
        match parsed {
            Ok(timeout) if timeout.is_zero() => None,
            Ok(timeout) => Some(timeout),
            Err(error) => {
                tracing::warn!(container = %self.name(), label = %key, value = raw, %error, "Could not parse lifecycle timeout, using default");
                Some(DEFAULT_LIFECYCLE_TIMEOUT)
            }
        }
    }

    pub fn image_info(&self) -> Option<&ImageDetails> {
        self.image.as_ref()
    }

    pub fn details(&self) -> &ContainerDetails {
        &self.details
    }

    /// Checks that a replacement can be built from this container.
    pub fn verify_configuration(&self) -> Result<(), ConfigError> {
        if self.image.is_none() {
            return Err(ConfigError::NoImageInfo);
        }
        if self.details.config.image.is_empty() && self.label(labels::ZODIAC_ORIGINAL_IMAGE).is_none() {
            return Err(ConfigError::InvalidConfig(
                "no image reference".to_string(),
            ));
        }
        Ok(())
    }

    /// Network endpoints with the old short-id alias dropped.
    pub fn network_config(&self) -> BTreeMap<String, EndpointSettings> {
        let own_alias = self.id().short_id();
        self.details
            .networks
            .iter()
            .map(|(network, endpoint)| {
                let mut endpoint = endpoint.clone();
                if let Some(aliases) = endpoint.aliases.as_mut() {
                    aliases.retain(|alias| alias != own_alias);
                }
                (network.clone(), endpoint)
            })
            .collect()
    }

    pub fn host_config(&self) -> HostConfig {
        create_host_config(&self.details)
    }

    /// Create request for the replacement: override-only config, rewritten
    /// host config and the first network endpoint.
    pub fn create_request(&self) -> Result<CreateContainerRequest, ConfigError> {
        let image = self.image.as_ref().ok_or(ConfigError::NoImageInfo)?;
        let config = create_config(&self.details, &image.config, &self.image_name());
        let networks = self
            .network_config()
            .into_iter()
            .take(1)
            .collect();
        Ok(CreateContainerRequest {
            name: self.details.name.clone(),
            config,
            host_config: self.host_config(),
            networks,
        })
    }
}

impl FilterableContainer for Container {
    fn name(&self) -> &str {
        Container::name(self)
    }

    fn is_watchtower(&self) -> bool {
        Container::is_watchtower(self)
    }

    fn enabled(&self) -> Option<bool> {
        Container::enabled(self)
    }

    fn scope(&self) -> Option<&str> {
        Container::scope(self)
    }

    fn image_name(&self) -> String {
        Container::image_name(self)
    }
}

fn with_slash(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

/// Boolean parsing accepting the spellings operators put in labels.
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ContainerConfig, ContainerState, ImageConfig};

    fn container_with_labels(pairs: &[(&str, &str)]) -> Container {
        let labels = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let details = ContainerDetails {
            id: ContainerId::new("0123456789abcdef0123"),
            name: "/web".to_string(),
            state: ContainerState {
                running: true,
                restarting: false,
                status: "running".to_string(),
            },
            config: ContainerConfig {
                image: "nginx".to_string(),
                labels,
                ..Default::default()
            },
            ..Default::default()
        };
        Container::new(details, Some(ImageDetails::default()))
    }

    #[test]
    fn image_name_defaults_tag() {
        assert_eq!(container_with_labels(&[]).image_name(), "nginx:latest");
    }

    #[test]
    fn image_name_ignores_registry_port() {
        let mut c = container_with_labels(&[]);
        c.details.config.image = "registry.local:5000/team/app".to_string();
        assert_eq!(c.image_name(), "registry.local:5000/team/app:latest");
    }

    #[test]
    fn zodiac_label_overrides_image() {
        let c = container_with_labels(&[(labels::ZODIAC_ORIGINAL_IMAGE, "ghcr.io/x/y:2")]);
        assert_eq!(c.image_name(), "ghcr.io/x/y:2");
    }

    #[test]
    fn enable_label_parsing() {
        assert_eq!(container_with_labels(&[]).enabled(), None);
        assert_eq!(container_with_labels(&[(labels::ENABLE, "true")]).enabled(), Some(true));
        assert_eq!(container_with_labels(&[(labels::ENABLE, "false")]).enabled(), Some(false));
        assert_eq!(container_with_labels(&[(labels::ENABLE, "maybe")]).enabled(), None);
    }

    #[test]
    fn monitor_only_precedence() {
        let off = container_with_labels(&[(labels::MONITOR_ONLY, "false")]);
        assert!(off.monitor_only(true, false));
        assert!(!off.monitor_only(true, true));

        let on = container_with_labels(&[(labels::MONITOR_ONLY, "true")]);
        assert!(on.monitor_only(false, false));

        let bad = container_with_labels(&[(labels::MONITOR_ONLY, "yes please")]);
        assert!(!bad.monitor_only(false, true));
        assert!(bad.monitor_only(true, true));
    }

    #[test]
    fn depends_on_replaces_links() {
        let mut c = container_with_labels(&[(labels::DEPENDS_ON, "db, /cache")]);
        c.details.host_config.links = Some(vec!["/ignored:/web/ignored".to_string()]);
        assert_eq!(c.links(), vec!["/db".to_string(), "/cache".to_string()]);
    }

    #[test]
    fn links_include_network_provider() {
        let mut c = container_with_labels(&[]);
        c.details.host_config.links = Some(vec!["/db:/web/db".to_string()]);
        c.details.host_config.network_mode = Some("container:/vpn".to_string());
        assert_eq!(c.links(), vec!["/db".to_string(), "/vpn".to_string()]);
    }

    #[test]
    fn lifecycle_timeout_forms() {
        let phase = Phase::PreUpdate;
        assert_eq!(
            container_with_labels(&[]).lifecycle_timeout(phase),
            Some(DEFAULT_LIFECYCLE_TIMEOUT)
        );
        let key = labels::lifecycle_timeout(phase.as_str());
        assert_eq!(
            container_with_labels(&[(&key, "5")]).lifecycle_timeout(phase),
            Some(Duration::from_secs(300))
        );
        assert_eq!(container_with_labels(&[(&key, "0")]).lifecycle_timeout(phase), None);
        assert_eq!(
            container_with_labels(&[(&key, "90s")]).lifecycle_timeout(phase),
            Some(Duration::from_secs(90))
        );
    }

    #[test]
    fn oversized_lifecycle_timeout_falls_back_to_default() {
        let key = labels::lifecycle_timeout(Phase::PreUpdate.as_str());
        let c = container_with_labels(&[(&key, "400000000000000000")]);
        assert_eq!(
            c.lifecycle_timeout(Phase::PreUpdate),
            Some(DEFAULT_LIFECYCLE_TIMEOUT)
        );
    }

    #[test]
    fn empty_lifecycle_command_is_absent() {
        let key = labels::lifecycle_command(Phase::PostCheck.as_str());
        assert_eq!(
            container_with_labels(&[(&key, "  ")]).lifecycle_command(Phase::PostCheck),
            None
        );
    }

    #[test]
    fn stop_signal_default() {
        assert_eq!(container_with_labels(&[]).stop_signal(), "SIGTERM");
        assert_eq!(
            container_with_labels(&[(labels::STOP_SIGNAL, "SIGHUP")]).stop_signal(),
            "SIGHUP"
        );
    }

    #[test]
    fn network_config_drops_short_id_alias() {
        let mut c = container_with_labels(&[]);
        c.details.networks.insert(
            "backend".to_string(),
            EndpointSettings {
                aliases: Some(vec!["0123456789ab".to_string(), "web".to_string()]),
                ..Default::default()
            },
        );
        let networks = c.network_config();
        assert_eq!(
            networks["backend"].aliases,
            Some(vec!["web".to_string()])
        );
    }

    #[test]
    fn verify_requires_image_info() {
        let c = container_with_labels(&[]);
        assert!(c.verify_configuration().is_ok());
        let bare = Container::new(c.details().clone(), None);
        assert_eq!(bare.verify_configuration(), Err(ConfigError::NoImageInfo));
    }

    #[test]
    fn create_request_uses_first_network_only() {
        let mut c = container_with_labels(&[]);
        for net in ["a", "b"] {
            c.details
                .networks
                .insert(net.to_string(), EndpointSettings::default());
        }
        c.image = Some(ImageDetails {
            config: ImageConfig::default(),
            ..Default::default()
        });
        let request = c.create_request().unwrap();
        assert_eq!(request.name, "/web");
        assert_eq!(request.networks.len(), 1);
        assert!(request.networks.contains_key("a"));
        assert_eq!(request.config.image, "nginx:latest");
    }
}
