//! The topology builder.
//!
//! [`Deployment::from_config`] turns a merged [`Config`] into a fully
//! validated topology in one pass: global settings, host allow-lists,
//! networks, groups and containers. The first violated rule aborts the build
//! with a location-qualified configuration error; no lifecycle operation ever
//! runs against a partially validated topology.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use paddock_common::{ContainerRef, HostFacts, PaddockError, PaddockResult};
use paddock_config::{
    Config, ContainerDefaults, ContainerSettings, EnvTemplate, HealthSettings, MountSettings,
};
use paddock_net::{build_networks, Network};

use crate::container::{build_create_spec, Container};
use crate::group::ContainerGroup;

const RESTART_POLICIES: [&str; 4] = ["no", "always", "unless-stopped", "on-failure"];

/// A validated deployment topology.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Container groups by name.
    pub groups: BTreeMap<String, ContainerGroup>,
    /// All declared networks by name.
    pub networks: BTreeMap<String, Network>,
    /// All containers ordered by (group order, container order, name).
    order: Vec<ContainerRef>,
}

impl Deployment {
    /// Build and validate the deployment topology from a merged configuration.
    pub fn from_config(config: &Config, facts: &HostFacts) -> PaddockResult<Self> {
        let global = &config.global;

        // Global settings and the global template layer.
        if global.base_dir.is_empty() {
            return Err(PaddockError::config("global: base_dir must be set"));
        }
        if !global.base_dir.starts_with('/') {
            return Err(PaddockError::config(format!(
                "global: base_dir \"{}\" must be an absolute path",
                global.base_dir
            )));
        }
        if !Path::new(&global.base_dir).is_dir() {
            return Err(PaddockError::config(format!(
                "global: base directory \"{}\" does not exist",
                global.base_dir
            )));
        }
        for entry in &global.env {
            if entry.name.is_empty() {
                return Err(PaddockError::config("global: env entry with an empty name"));
            }
        }
        let mut pairs = vec![("BASE_DIR".to_string(), global.base_dir.clone())];
        pairs.extend(global.env.iter().map(|e| (e.name.clone(), e.value.clone())));
        let global_tpl = EnvTemplate::system(facts).overridden_pairs(&pairs)?;

        let global_mounts: Vec<MountSettings> = global
            .mounts
            .iter()
            .map(|m| m.templated(&global_tpl))
            .collect();
        for mount in &global_mounts {
            validate_mount("global", mount)?;
        }
        validate_defaults(&global.defaults)?;

        // Host allow-lists. An absent section admits every container.
        let mut host_names = HashSet::new();
        for host in &config.hosts {
            if host.name.is_empty() {
                return Err(PaddockError::config("hosts: host with an empty name"));
            }
            if !host_names.insert(host.name.as_str()) {
                return Err(PaddockError::config(format!(
                    "hosts: duplicate host \"{}\"",
                    host.name
                )));
            }
            for reference in &host.allow {
                reference.validate(&format!("host \"{}\"", host.name))?;
            }
        }
        let allowed: Option<HashSet<ContainerRef>> = if config.hosts.is_empty() {
            None
        } else {
            Some(
                config
                    .hosts
                    .iter()
                    .filter(|h| h.name == facts.host_name)
                    .flat_map(|h| h.allow.iter().cloned())
                    .collect(),
            )
        };

        // Networks.
        let mut model = build_networks(&config.networks)?;

        // Groups.
        let mut groups: BTreeMap<String, ContainerGroup> = BTreeMap::new();
        for settings in &config.groups {
            if settings.name.is_empty() {
                return Err(PaddockError::config("groups: group with an empty name"));
            }
            if settings.order == 0 {
                return Err(PaddockError::config(format!(
                    "group \"{}\": order must be positive",
                    settings.name
                )));
            }
            if groups
                .insert(
                    settings.name.clone(),
                    ContainerGroup::new(&settings.name, settings.order),
                )
                .is_some()
            {
                return Err(PaddockError::config(format!(
                    "groups: duplicate group \"{}\"",
                    settings.name
                )));
            }
        }

        // Containers.
        let mut declared: HashSet<ContainerRef> = HashSet::new();
        let mut sequencing: Vec<(u32, u32, ContainerRef)> = Vec::new();
        for settings in &config.containers {
            let reference = settings.reference();
            reference.validate("containers")?;
            let context = format!("container \"{reference}\"");

            if !declared.insert(reference.clone()) {
                return Err(PaddockError::config(format!(
                    "{context}: declared more than once"
                )));
            }
            if settings.order == 0 {
                return Err(PaddockError::config(format!(
                    "{context}: order must be positive"
                )));
            }

            let group = groups.get_mut(&settings.group).ok_or_else(|| {
                PaddockError::config(format!(
                    "{context}: references undefined group \"{}\"",
                    settings.group
                ))
            })?;

            // The per-container template layer.
            for entry in &settings.env {
                if entry.name.is_empty() {
                    return Err(PaddockError::config(format!(
                        "{context}: env entry with an empty name"
                    )));
                }
            }
            let container_dir = format!(
                "{}/{}/{}",
                global.base_dir, reference.group, reference.container
            );
            let mut pairs = vec![
                ("CONTAINER_DIR".to_string(), container_dir),
                ("CONTAINER_GROUP".to_string(), reference.group.clone()),
                ("CONTAINER_NAME".to_string(), reference.container.clone()),
            ];
            pairs.extend(settings.env.iter().map(|e| (e.name.clone(), e.value.clone())));
            let tpl = global_tpl.overridden_pairs(&pairs)?;
            let resolved = settings.templated(&tpl);

            validate_container(&context, &resolved)?;

            let stop_timeout_secs = resolved
                .stop_timeout_secs
                .unwrap_or(global.defaults.stop_timeout_secs);
            if stop_timeout_secs == 0 {
                return Err(PaddockError::config(format!(
                    "{context}: stop_timeout_secs must be positive"
                )));
            }

            let endpoints = model.endpoints.remove(&reference).unwrap_or_default();
            let shared_stack = model.shared_stacks.remove(&reference);
            let create_spec = build_create_spec(
                &reference,
                &resolved,
                &global.defaults,
                &global_mounts,
                &endpoints,
                shared_stack.as_ref(),
            )?;

            sequencing.push((group.order, resolved.order, reference.clone()));
            let container = Container {
                allowed_on_host: allowed
                    .as_ref()
                    .is_none_or(|set| set.contains(&reference)),
                group_order: group.order,
                stop_timeout_secs,
                purge_delay_ms: global.defaults.purge_delay_ms,
                pull: resolved.image.pull.unwrap_or(global.defaults.pull),
                platform: resolved
                    .image
                    .platform
                    .clone()
                    .or_else(|| global.defaults.platform.clone()),
                endpoints,
                shared_stack,
                create_spec,
                settings: resolved,
                reference: reference.clone(),
            };
            group
                .containers
                .insert(reference.container.clone(), container);
        }

        // Every network reference must point at a declared container.
        let mut dangling: Vec<&ContainerRef> = model.endpoints.keys().collect();
        dangling.sort();
        if let Some(&reference) = dangling.first() {
            let network = &model.endpoints[reference][0].network;
            return Err(PaddockError::config(format!(
                "network \"{network}\": references undefined container \"{reference}\""
            )));
        }
        let mut dangling: Vec<&ContainerRef> = model.shared_stacks.keys().collect();
        dangling.sort();
        if let Some(&reference) = dangling.first() {
            let network = &model.shared_stacks[reference].network;
            return Err(PaddockError::config(format!(
                "network \"{network}\": attaches undefined container \"{reference}\""
            )));
        }
        for network in model.networks.values() {
            if let Network::Container(net) = network {
                if !declared.contains(&net.target) {
                    return Err(PaddockError::config(format!(
                        "network \"{}\": target container \"{}\" is not declared",
                        net.name, net.target
                    )));
                }
            }
        }

        sequencing.sort();
        Ok(Self {
            groups,
            networks: model.networks,
            order: sequencing.into_iter().map(|(_, _, r)| r).collect(),
        })
    }

    /// Look up a container by reference.
    #[must_use]
    pub fn container(&self, reference: &ContainerRef) -> Option<&Container> {
        self.groups
            .get(&reference.group)
            .and_then(|g| g.containers.get(&reference.container))
    }

    /// All containers in lifecycle order.
    #[must_use]
    pub fn containers_in_order(&self) -> Vec<&Container> {
        self.order
            .iter()
            .filter_map(|reference| self.container(reference))
            .collect()
    }

    /// Resolve a container selector to an ordered list of containers.
    ///
    /// Passing `all` selects every container. A `group` narrows to one group
    /// and an additional `container` to a single container. Both start and
    /// stop batches use the same ordering.
    pub fn query_containers(
        &self,
        all: bool,
        group: Option<&str>,
        container: Option<&str>,
    ) -> PaddockResult<Vec<&Container>> {
        if all {
            return Ok(self.containers_in_order());
        }
        let Some(group_name) = group else {
            return Err(PaddockError::config(
                "no container selector given (use --all, or a group and optionally a container)",
            ));
        };
        if !self.groups.contains_key(group_name) {
            return Err(PaddockError::GroupNotFound {
                name: group_name.to_string(),
            });
        }

        let selected: Vec<&Container> = self
            .containers_in_order()
            .into_iter()
            .filter(|c| c.reference.group == group_name)
            .filter(|c| container.is_none_or(|name| c.reference.container == name))
            .collect();
        if selected.is_empty() {
            if let Some(name) = container {
                return Err(PaddockError::ContainerNotFound {
                    name: ContainerRef::new(group_name, name).to_string(),
                });
            }
        }
        Ok(selected)
    }

    /// Look up a network by name.
    pub fn query_network(&self, name: &str) -> PaddockResult<&Network> {
        self.networks
            .get(name)
            .ok_or_else(|| PaddockError::NetworkNotFound {
                name: name.to_string(),
            })
    }
}

fn validate_defaults(defaults: &ContainerDefaults) -> PaddockResult<()> {
    if defaults.stop_timeout_secs == 0 {
        return Err(PaddockError::config(
            "global defaults: stop_timeout_secs must be positive",
        ));
    }
    if let Some(policy) = &defaults.restart_policy {
        validate_restart_policy("global defaults", policy)?;
    }
    Ok(())
}

fn validate_restart_policy(context: &str, policy: &str) -> PaddockResult<()> {
    if RESTART_POLICIES.contains(&policy) {
        Ok(())
    } else {
        Err(PaddockError::config(format!(
            "{context}: unknown restart policy \"{policy}\" (expected one of: {})",
            RESTART_POLICIES.join(", ")
        )))
    }
}

fn validate_mount(context: &str, mount: &MountSettings) -> PaddockResult<()> {
    if mount.source.is_empty() || !mount.source.starts_with('/') {
        return Err(PaddockError::config(format!(
            "{context}: mount source \"{}\" must be an absolute path",
            mount.source
        )));
    }
    if mount.target.is_empty() || !mount.target.starts_with('/') {
        return Err(PaddockError::config(format!(
            "{context}: mount target \"{}\" must be an absolute path",
            mount.target
        )));
    }
    Ok(())
}

fn validate_health(context: &str, health: &HealthSettings) -> PaddockResult<()> {
    if health.test.is_empty() {
        return Err(PaddockError::config(format!(
            "{context}: health test command is empty"
        )));
    }
    if health.interval_secs == 0 || health.timeout_secs == 0 {
        return Err(PaddockError::config(format!(
            "{context}: health interval and timeout must be positive"
        )));
    }
    if health.timeout_secs > health.interval_secs {
        return Err(PaddockError::config(format!(
            "{context}: health timeout exceeds the check interval"
        )));
    }
    if health.retries == 0 {
        return Err(PaddockError::config(format!(
            "{context}: health retries must be positive"
        )));
    }
    Ok(())
}

fn validate_container(context: &str, settings: &ContainerSettings) -> PaddockResult<()> {
    if settings.image.reference.is_empty() {
        return Err(PaddockError::config(format!(
            "{context}: image reference is empty"
        )));
    }
    if let Some(policy) = &settings.restart_policy {
        validate_restart_policy(context, policy)?;
    }
    if settings.start_pre_hook.first().is_some_and(|s| s.is_empty()) {
        return Err(PaddockError::config(format!(
            "{context}: start_pre_hook command is empty"
        )));
    }
    if settings.labels.keys().any(|k| k.is_empty()) {
        return Err(PaddockError::config(format!(
            "{context}: label with an empty key"
        )));
    }
    if settings.sysctls.keys().any(|k| k.is_empty()) {
        return Err(PaddockError::config(format!(
            "{context}: sysctl with an empty key"
        )));
    }
    for mount in &settings.mounts {
        validate_mount(context, mount)?;
    }
    for device in &settings.devices {
        if device.host.is_empty() || !device.host.starts_with('/') {
            return Err(PaddockError::config(format!(
                "{context}: device path \"{}\" must be an absolute path",
                device.host
            )));
        }
        if device.permissions.is_empty()
            || !device.permissions.chars().all(|c| "rwm".contains(c))
        {
            return Err(PaddockError::config(format!(
                "{context}: device permissions \"{}\" must be a combination of r, w and m",
                device.permissions
            )));
        }
    }
    let mut published = HashSet::new();
    for port in &settings.ports {
        if port.host == 0 || port.container == 0 {
            return Err(PaddockError::config(format!(
                "{context}: port numbers must be positive"
            )));
        }
        if port.protocol != "tcp" && port.protocol != "udp" {
            return Err(PaddockError::config(format!(
                "{context}: unknown port protocol \"{}\" (expected tcp or udp)",
                port.protocol
            )));
        }
        if !published.insert((port.host_ip.clone(), port.host, port.protocol.clone())) {
            return Err(PaddockError::config(format!(
                "{context}: host port {}/{} published more than once",
                port.host, port.protocol
            )));
        }
    }
    if let Some(health) = &settings.health {
        validate_health(context, health)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    use paddock_net::Endpoint;
    use paddock_runtime::NetworkAttachment;

    fn facts() -> HostFacts {
        HostFacts {
            host_name: "host-a".to_string(),
            pretty_name: "host-a".to_string(),
            address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
        }
    }

    fn config(yaml: &str) -> (Config, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let yaml = yaml.replace("BASE", dir.path().to_str().unwrap());
        (Config::from_yaml(&yaml).unwrap(), dir)
    }

    #[test]
    fn builds_a_minimal_topology() {
        let (cfg, _dir) = config(
            r#"
global:
  base_dir: BASE
groups:
  - name: infra
    order: 1
containers:
  - group: infra
    name: proxy
    order: 1
    image:
      reference: nginx:1.27
"#,
        );

        let deployment = Deployment::from_config(&cfg, &facts()).unwrap();
        let container = deployment
            .container(&ContainerRef::new("infra", "proxy"))
            .unwrap();
        assert!(container.allowed_on_host);
        assert_eq!(container.stop_timeout_secs, 10);
        assert_eq!(container.create_spec.name, "infra-proxy");
    }

    #[test]
    fn rejects_undefined_group() {
        let (cfg, _dir) = config(
            r#"
global:
  base_dir: BASE
containers:
  - group: ghost
    name: proxy
    order: 1
    image:
      reference: nginx:1.27
"#,
        );

        let err = Deployment::from_config(&cfg, &facts()).unwrap_err();
        assert!(err.to_string().contains("undefined group \"ghost\""));
    }

    #[test]
    fn rejects_duplicate_container() {
        let (cfg, _dir) = config(
            r#"
global:
  base_dir: BASE
groups:
  - name: infra
    order: 1
containers:
  - group: infra
    name: proxy
    order: 1
    image:
      reference: nginx:1.27
  - group: infra
    name: proxy
    order: 2
    image:
      reference: nginx:1.27
"#,
        );

        let err = Deployment::from_config(&cfg, &facts()).unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn rejects_network_endpoint_for_undeclared_container() {
        let (cfg, _dir) = config(
            r#"
global:
  base_dir: BASE
networks:
  bridge:
    - name: lan
      host_interface: pd-lan
      cidr: 172.20.0.0/24
      priority: 1
      containers:
        - group: infra
          container: ghost
"#,
        );

        let err = Deployment::from_config(&cfg, &facts()).unwrap_err();
        assert!(err
            .to_string()
            .contains("references undefined container \"infra-ghost\""));
    }

    #[test]
    fn orders_by_group_then_container_then_name() {
        let (cfg, _dir) = config(
            r#"
global:
  base_dir: BASE
groups:
  - name: apps
    order: 2
  - name: infra
    order: 1
containers:
  - group: apps
    name: web
    order: 1
    image:
      reference: web:1
  - group: infra
    name: dns
    order: 2
    image:
      reference: dns:1
  - group: infra
    name: proxy
    order: 1
    image:
      reference: proxy:1
  - group: infra
    name: cache
    order: 2
    image:
      reference: cache:1
"#,
        );

        let deployment = Deployment::from_config(&cfg, &facts()).unwrap();
        let names: Vec<String> = deployment
            .containers_in_order()
            .iter()
            .map(|c| c.runtime_name())
            .collect();
        assert_eq!(
            names,
            vec!["infra-proxy", "infra-cache", "infra-dns", "apps-web"]
        );
    }

    #[test]
    fn selector_resolves_groups_and_containers() {
        let (cfg, _dir) = config(
            r#"
global:
  base_dir: BASE
groups:
  - name: infra
    order: 1
containers:
  - group: infra
    name: proxy
    order: 1
    image:
      reference: nginx:1.27
"#,
        );

        let deployment = Deployment::from_config(&cfg, &facts()).unwrap();
        assert_eq!(deployment.query_containers(true, None, None).unwrap().len(), 1);
        assert_eq!(
            deployment
                .query_containers(false, Some("infra"), Some("proxy"))
                .unwrap()
                .len(),
            1
        );

        let err = deployment
            .query_containers(false, Some("ghost"), None)
            .unwrap_err();
        assert!(matches!(err, PaddockError::GroupNotFound { .. }));

        let err = deployment
            .query_containers(false, Some("infra"), Some("ghost"))
            .unwrap_err();
        assert!(matches!(err, PaddockError::ContainerNotFound { .. }));
    }

    #[test]
    fn host_allow_list_gates_containers() {
        let (cfg, _dir) = config(
            r#"
global:
  base_dir: BASE
hosts:
  - name: host-b
    allow:
      - group: infra
        container: proxy
groups:
  - name: infra
    order: 1
containers:
  - group: infra
    name: proxy
    order: 1
    image:
      reference: nginx:1.27
"#,
        );

        // The allow-list names a different host, so nothing runs here.
        let deployment = Deployment::from_config(&cfg, &facts()).unwrap();
        let container = deployment
            .container(&ContainerRef::new("infra", "proxy"))
            .unwrap();
        assert!(!container.allowed_on_host);
    }

    #[test]
    fn container_templating_resolves_derived_tokens() {
        let (cfg, dir) = config(
            r#"
global:
  base_dir: BASE
groups:
  - name: infra
    order: 1
containers:
  - group: infra
    name: proxy
    order: 1
    image:
      reference: nginx:1.27
    env:
      - name: DATA
        value: $$CONTAINER_DIR$$/data
    mounts:
      - source: $$CONTAINER_DIR$$/conf
        target: /etc/nginx/conf.d
"#,
        );

        let deployment = Deployment::from_config(&cfg, &facts()).unwrap();
        let container = deployment
            .container(&ContainerRef::new("infra", "proxy"))
            .unwrap();
        let base = dir.path().to_str().unwrap();
        assert_eq!(
            container.create_spec.env,
            vec![format!("DATA={base}/infra/proxy/data")]
        );
        assert_eq!(
            container.create_spec.binds,
            vec![format!("{base}/infra/proxy/conf:/etc/nginx/conf.d:rw")]
        );
    }

    #[test]
    fn primary_endpoint_follows_network_priority() {
        let (cfg, _dir) = config(
            r#"
global:
  base_dir: BASE
networks:
  bridge:
    - name: backup
      host_interface: pd-backup
      cidr: 172.21.0.0/24
      priority: 5
      containers:
        - group: infra
          container: proxy
    - name: lan
      host_interface: pd-lan
      cidr: 172.20.0.0/24
      priority: 1
      containers:
        - group: infra
          container: proxy
          ip: 172.20.0.10
groups:
  - name: infra
    order: 1
containers:
  - group: infra
    name: proxy
    order: 1
    image:
      reference: nginx:1.27
"#,
        );

        let deployment = Deployment::from_config(&cfg, &facts()).unwrap();
        let container = deployment
            .container(&ContainerRef::new("infra", "proxy"))
            .unwrap();

        // Priority 1 wins the primary slot regardless of declaration order.
        assert_eq!(
            container.primary_endpoint(),
            Some(&Endpoint {
                network: "lan".to_string(),
                priority: 1,
                ip: Some("172.20.0.10".parse().unwrap()),
            })
        );
        assert_eq!(container.secondary_endpoints().len(), 1);
        assert_eq!(container.secondary_endpoints()[0].network, "backup");
        assert_eq!(
            container.create_spec.network,
            NetworkAttachment::Bridge {
                network: "lan".to_string(),
                ip: Some("172.20.0.10".parse().unwrap()),
            }
        );
    }

    #[test]
    fn rejects_invalid_port_protocol() {
        let (cfg, _dir) = config(
            r#"
global:
  base_dir: BASE
groups:
  - name: infra
    order: 1
containers:
  - group: infra
    name: proxy
    order: 1
    image:
      reference: nginx:1.27
    ports:
      - host: 80
        container: 80
        protocol: sctp
"#,
        );

        let err = Deployment::from_config(&cfg, &facts()).unwrap_err();
        assert!(err.to_string().contains("unknown port protocol"));
    }

    #[test]
    fn rejects_health_timeout_beyond_interval() {
        let (cfg, _dir) = config(
            r#"
global:
  base_dir: BASE
groups:
  - name: infra
    order: 1
containers:
  - group: infra
    name: proxy
    order: 1
    image:
      reference: nginx:1.27
    health:
      test: ["curl", "-f", "http://localhost/"]
      interval_secs: 5
      timeout_secs: 20
"#,
        );

        let err = Deployment::from_config(&cfg, &facts()).unwrap_err();
        assert!(err
            .to_string()
            .contains("health timeout exceeds the check interval"));
    }

    #[test]
    fn rejects_missing_base_dir() {
        let cfg = Config::from_yaml("global:\n  base_dir: /does/not/exist\n").unwrap();
        let err = Deployment::from_config(&cfg, &facts()).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
