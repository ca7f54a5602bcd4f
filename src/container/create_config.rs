// ABOUTME: Rebuilds an override-only create request from an inspected container.
// ABOUTME: Strips image defaults so the replacement inherits the new image's defaults.

use crate::runtime::{ContainerConfig, ContainerDetails, HealthConfig, HostConfig, ImageConfig};
use crate::util::{map_subtract, slice_subtract};

/// Strips values identical to the image defaults from the inspected config.
///
/// `image_name` replaces the config's image so the replacement uses the
/// resolved reference rather than the old image id.
pub fn create_config(
    details: &ContainerDetails,
    image: &ImageConfig,
    image_name: &str,
) -> ContainerConfig {
    let mut config = details.config.clone();

    if config.working_dir == image.working_dir {
        config.working_dir.clear();
    }

    if config.user == image.user {
        config.user.clear();
    }

    if is_container_network(&details.host_config) {
        config.hostname.clear();
    }

    // A user-supplied cmd survives when the entrypoint is inherited.
    if config.entrypoint == image.entrypoint {
        config.entrypoint = None;
        if config.cmd == image.cmd {
            config.cmd = None;
        }
    }

    if let (Some(health), Some(defaults)) = (config.healthcheck.as_mut(), image.healthcheck.as_ref())
    {
        strip_health_defaults(health, defaults);
    }

    config.env = slice_subtract(&config.env, &image.env);
    config.labels = map_subtract(&config.labels, &image.labels);
    config.volumes = slice_subtract(&config.volumes, &image.volumes);

    let mut exposed = slice_subtract(&config.exposed_ports, &image.exposed_ports);
    // The engine rejects bindings for ports that are not exposed.
    if let Some(bindings) = details.host_config.port_bindings.as_ref() {
        exposed.extend(bindings.keys().cloned());
    }
    exposed.sort();
    exposed.dedup();
    config.exposed_ports = exposed;

    config.image = image_name.to_string();
    config
}

fn strip_health_defaults(health: &mut HealthConfig, defaults: &HealthConfig) {
    if health.test == defaults.test {
        health.test = None;
    }
    if health.retries == defaults.retries {
        health.retries = None;
    }
    if health.interval == defaults.interval {
        health.interval = None;
    }
    if health.timeout == defaults.timeout {
        health.timeout = None;
    }
    if health.start_period == defaults.start_period {
        health.start_period = None;
    }
}

/// Host config with links rewritten from inspect's `/src:/dst/alias` form into
/// the `/src:alias` form create accepts.
pub fn create_host_config(details: &ContainerDetails) -> HostConfig {
    let mut host_config = details.host_config.clone();
    if let Some(links) = host_config.links.as_mut() {
        for link in links.iter_mut() {
            if let Some((source, target)) = link.split_once(':') {
                let alias = target.rsplit('/').next().unwrap_or(target);
                *link = format!("{}:{}", source, alias);
            }
        }
    }
    host_config
}

pub(crate) fn is_container_network(host_config: &HostConfig) -> bool {
    host_config
        .network_mode
        .as_deref()
        .is_some_and(|mode| mode.starts_with("container:"))
}

pub(crate) fn is_host_network(host_config: &HostConfig) -> bool {
    host_config.network_mode.as_deref() == Some("host")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::PortBinding;
    use std::collections::{BTreeMap, HashMap};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn details_with(config: ContainerConfig, host_config: HostConfig) -> ContainerDetails {
        ContainerDetails {
            name: "/app".to_string(),
            config,
            host_config,
            ..Default::default()
        }
    }

    #[test]
    fn inherited_values_are_stripped() {
        let image = ImageConfig {
            user: "nobody".to_string(),
            working_dir: "/srv".to_string(),
            env: strings(&["PATH=/usr/bin"]),
            entrypoint: Some(strings(&["/entry"])),
            cmd: Some(strings(&["serve"])),
            labels: BTreeMap::from([("maintainer".to_string(), "x".to_string())]),
            ..Default::default()
        };
        let config = ContainerConfig {
            user: "nobody".to_string(),
            working_dir: "/srv".to_string(),
            env: strings(&["PATH=/usr/bin", "MODE=prod"]),
            entrypoint: Some(strings(&["/entry"])),
            cmd: Some(strings(&["serve"])),
            labels: BTreeMap::from([
                ("maintainer".to_string(), "x".to_string()),
                ("team".to_string(), "core".to_string()),
            ]),
            image: "sha256:old".to_string(),
            ..Default::default()
        };

        let out = create_config(
            &details_with(config, HostConfig::default()),
            &image,
            "app:latest",
        );

        assert!(out.user.is_empty());
        assert!(out.working_dir.is_empty());
        assert_eq!(out.env, strings(&["MODE=prod"]));
        assert_eq!(out.entrypoint, None);
        assert_eq!(out.cmd, None);
        assert_eq!(out.labels.len(), 1);
        assert_eq!(out.image, "app:latest");
    }

    #[test]
    fn user_cmd_survives_inherited_entrypoint() {
        let image = ImageConfig {
            entrypoint: Some(strings(&["/entry"])),
            cmd: Some(strings(&["serve"])),
            ..Default::default()
        };
        let config = ContainerConfig {
            entrypoint: Some(strings(&["/entry"])),
            cmd: Some(strings(&["migrate"])),
            ..Default::default()
        };

        let out = create_config(&details_with(config, HostConfig::default()), &image, "a:1");

        assert_eq!(out.entrypoint, None);
        assert_eq!(out.cmd, Some(strings(&["migrate"])));
    }

    #[test]
    fn custom_entrypoint_keeps_cmd() {
        let image = ImageConfig {
            entrypoint: Some(strings(&["/entry"])),
            cmd: Some(strings(&["serve"])),
            ..Default::default()
        };
        let config = ContainerConfig {
            entrypoint: Some(strings(&["/other"])),
            cmd: Some(strings(&["serve"])),
            ..Default::default()
        };

        let out = create_config(&details_with(config, HostConfig::default()), &image, "a:1");

        assert_eq!(out.entrypoint, Some(strings(&["/other"])));
        assert_eq!(out.cmd, Some(strings(&["serve"])));
    }

    #[test]
    fn bound_ports_are_always_exposed() {
        let image = ImageConfig {
            exposed_ports: strings(&["80/tcp"]),
            ..Default::default()
        };
        let config = ContainerConfig {
            exposed_ports: strings(&["80/tcp", "9000/tcp"]),
            ..Default::default()
        };
        let host_config = HostConfig {
            port_bindings: Some(HashMap::from([(
                "443/tcp".to_string(),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some("8443".to_string()),
                }]),
            )])),
            ..Default::default()
        };

        let out = create_config(&details_with(config, host_config), &image, "a:1");

        assert_eq!(out.exposed_ports, strings(&["443/tcp", "9000/tcp"]));
    }

    #[test]
    fn hostname_blank_for_container_network() {
        let config = ContainerConfig {
            hostname: "abc123".to_string(),
            ..Default::default()
        };
        let host_config = HostConfig {
            network_mode: Some("container:vpn".to_string()),
            ..Default::default()
        };

        let out = create_config(
            &details_with(config, host_config),
            &ImageConfig::default(),
            "a:1",
        );

        assert!(out.hostname.is_empty());
    }

    #[test]
    fn links_are_rewritten() {
        let host_config = HostConfig {
            links: Some(strings(&["/db:/app/database", "/cache:/app/cache"])),
            ..Default::default()
        };

        let out = create_host_config(&details_with(ContainerConfig::default(), host_config));

        assert_eq!(out.links, Some(strings(&["/db:database", "/cache:cache"])));
    }
}
