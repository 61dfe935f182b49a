//! gatewatch.toml configuration parser.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{GatewayDescriptor, GatewayKind, Ipv4Cidr};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/gatewatch.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewatchConfig {
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default, rename = "gateway")]
    pub gateways: Vec<GatewayConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Apply route/firewall/lease changes. When false, only log them.
    pub perform_remediation: bool,
    pub cycle_interval_secs: u64,
    /// Minimum continuous down time before the active gateway is abandoned.
    pub failover_delay_secs: u64,
    pub state_file: PathBuf,
    pub pid_file: PathBuf,
    /// Wait after bringing an on-demand link up before reading its peer.
    pub link_settle_secs: u64,
    /// Renew a lease once its remaining time is at or below this.
    pub lease_renewal_unit_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            perform_remediation: false,
            cycle_interval_secs: 60,
            failover_delay_secs: 120,
            state_file: PathBuf::from("/var/db/gatewatch.state"),
            pid_file: PathBuf::from("/var/run/gatewatch.pid"),
            link_settle_secs: 10,
            lease_renewal_unit_secs: 3600,
        }
    }
}

impl DaemonConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn link_settle(&self) -> Duration {
        Duration::from_secs(self.link_settle_secs)
    }

    pub fn lease_renewal_unit(&self) -> Duration {
        Duration::from_secs(self.lease_renewal_unit_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMethod {
    Icmp,
    Tcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub method: ProbeMethod,
    pub tcp_port: u16,
    pub timeout_secs: u64,
    pub retry_timeout_secs: u64,
    /// Extra attempts after the first failed probe.
    pub max_retries: u32,
    /// Attempt number from which each retry is logged.
    pub notify_threshold: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            method: ProbeMethod::Icmp,
            tcp_port: 53,
            timeout_secs: 1,
            retry_timeout_secs: 2,
            max_retries: 4,
            notify_threshold: 3,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_secs(self.retry_timeout_secs)
    }
}

/// Command templates for every OS interaction.
///
/// Templates are split on whitespace; tokens such as `{gateway}` are
/// substituted whole, so no shell is involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub route_show: String,
    pub route_replace: String,
    pub route_delete: String,
    pub state_flush: String,
    pub lease_query: String,
    pub lease_renew: String,
    pub link_up: String,
    pub link_query: String,
    pub ping: String,
    pub mail: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            route_show: "ip -4 route show default".to_string(),
            route_replace: "ip route replace default via {gateway}".to_string(),
            route_delete: "ip route del {network} via {gateway}".to_string(),
            state_flush: "conntrack -D -d {address}".to_string(),
            lease_query: "dhcp-lease-info {interface}".to_string(),
            lease_renew: "dhclient -1 {interface}".to_string(),
            link_up: "ifup {interface}".to_string(),
            link_query: "ip -4 addr show dev {interface}".to_string(),
            ping: "ping -n -c 1 -W {timeout} {address}".to_string(),
            mail: "mail -s {subject} -r {from} {to}".to_string(),
        }
    }
}

impl CommandsConfig {
    fn templates(&self) -> [(&'static str, &str); 10] {
        [
            ("route_show", &self.route_show),
            ("route_replace", &self.route_replace),
            ("route_delete", &self.route_delete),
            ("state_flush", &self.state_flush),
            ("lease_query", &self.lease_query),
            ("lease_renew", &self.lease_renew),
            ("link_up", &self.link_up),
            ("link_query", &self.link_query),
            ("ping", &self.ping),
            ("mail", &self.mail),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub address: String,
    pub probe: Option<String>,
    pub interface: Option<String>,
    pub kind: GatewayKind,
    pub routes: Option<Vec<String>>,
}

impl GatewatchConfig {
    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: GatewatchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check everything that `gateways()` does not already check.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.probe.max_retries == 0 {
            return Err(ConfigError::InvalidSetting(
                "probe.max_retries must be at least 1".to_string(),
            ));
        }
        if self.probe.notify_threshold == 0 {
            return Err(ConfigError::InvalidSetting(
                "probe.notify_threshold must be at least 1".to_string(),
            ));
        }
        if self.probe.timeout_secs == 0 || self.probe.retry_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting(
                "probe.timeout_secs and probe.retry_timeout_secs must be positive".to_string(),
            ));
        }
        if self.daemon.cycle_interval_secs == 0 {
            return Err(ConfigError::InvalidSetting(
                "daemon.cycle_interval_secs must be positive".to_string(),
            ));
        }
        for (name, template) in self.commands.templates() {
            if !placeholders_balanced(template) || template.trim().is_empty() {
                return Err(ConfigError::InvalidTemplate {
                    name,
                    template: template.to_string(),
                });
            }
        }
        self.gateways().map(|_| ())
    }

    /// Build the priority-ordered descriptor list.
    pub fn gateways(&self) -> ConfigResult<Vec<GatewayDescriptor>> {
        if self.gateways.is_empty() {
            return Err(ConfigError::NoGateways);
        }

        let mut descriptors = Vec::with_capacity(self.gateways.len());
        for (index, entry) in self.gateways.iter().enumerate() {
            let address = parse_addr(index, &entry.address)?;
            let probe = match &entry.probe {
                Some(p) => parse_addr(index, p)?,
                None => address,
            };

            let mut routes = Vec::new();
            if let Some(raw) = &entry.routes {
                if entry.kind != GatewayKind::DhcpLeaseBackup {
                    return Err(ConfigError::RoutesNotAllowed { index });
                }
                for value in raw {
                    let cidr: Ipv4Cidr = value.parse().map_err(|_| ConfigError::InvalidRoute {
                        index,
                        value: value.clone(),
                    })?;
                    routes.push(cidr);
                }
            }

            if entry.kind == GatewayKind::OnDemand && entry.interface.is_none() {
                return Err(ConfigError::MissingInterface {
                    index,
                    kind: entry.kind.as_str(),
                });
            }

            descriptors.push(GatewayDescriptor {
                priority: index,
                gateway_address: address,
                probe_address: probe,
                interface: entry.interface.clone(),
                routes,
                kind: entry.kind,
            });
        }

        if !descriptors.iter().any(|d| d.kind.is_routable()) {
            return Err(ConfigError::NoRoutableGateway);
        }

        Ok(descriptors)
    }
}

fn parse_addr(index: usize, value: &str) -> ConfigResult<Ipv4Addr> {
    value.trim().parse().map_err(|_| ConfigError::InvalidAddress {
        index,
        value: value.to_string(),
    })
}

/// `{` and `}` must alternate, starting with `{`.
fn placeholders_balanced(template: &str) -> bool {
    let mut open = false;
    for c in template.chars() {
        match c {
            '{' if open => return false,
            '{' => open = true,
            '}' if !open => return false,
            '}' => open = false,
            _ => {}
        }
    }
    !open
}
