//! Port traits for every host interaction, and their shell-backed
//! implementation.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use gatewatch_core::config::CommandsConfig;
use gatewatch_core::template;

use crate::command::{CommandOutput, CommandRunner};
use crate::error::{CommandError, CommandResult};
use crate::parse::{self, Lease};

/// Routing table access.
#[async_trait]
pub trait Router: Send + Sync {
    /// Next hops of the installed default route(s), in table order.
    async fn default_routes(&self) -> CommandResult<Vec<Ipv4Addr>>;

    /// Make `gateway` the only default next hop.
    async fn replace_default(&self, gateway: Ipv4Addr) -> CommandResult<()>;

    /// Remove `network` (`"default"` or a CIDR) routed via `gateway`.
    async fn delete_route(&self, network: &str, gateway: Ipv4Addr) -> CommandResult<()>;
}

/// Connection-tracking state.
#[async_trait]
pub trait Firewall: Send + Sync {
    /// Drop tracked connections keyed to `address`.
    async fn flush_state(&self, address: Ipv4Addr) -> CommandResult<()>;
}

/// DHCP lease manager.
#[async_trait]
pub trait LeaseManager: Send + Sync {
    async fn query(&self, interface: &str) -> CommandResult<Lease>;
    async fn renew(&self, interface: &str) -> CommandResult<()>;
}

/// On-demand links.
#[async_trait]
pub trait LinkDialer: Send + Sync {
    async fn bring_up(&self, interface: &str) -> CommandResult<()>;
    /// Remote end of the point-to-point link.
    async fn peer_address(&self, interface: &str) -> CommandResult<Ipv4Addr>;
}

/// The set of ports the executor drives.
#[derive(Clone)]
pub struct Ports {
    pub router: Arc<dyn Router>,
    pub firewall: Arc<dyn Firewall>,
    pub leases: Arc<dyn LeaseManager>,
    pub links: Arc<dyn LinkDialer>,
}

impl Ports {
    /// All four ports backed by one [`ShellPorts`].
    pub fn shell(shell: ShellPorts) -> Self {
        let shell = Arc::new(shell);
        Self {
            router: shell.clone(),
            firewall: shell.clone(),
            leases: shell.clone(),
            links: shell,
        }
    }
}

/// Implements every port by running the configured command templates.
pub struct ShellPorts {
    runner: Arc<dyn CommandRunner>,
    commands: CommandsConfig,
}

impl ShellPorts {
    pub fn new(runner: Arc<dyn CommandRunner>, commands: CommandsConfig) -> Self {
        Self { runner, commands }
    }

    /// Render `command`, run it and fail on a non-zero exit.
    async fn exec(&self, command: &str, vars: &[(&str, &str)]) -> CommandResult<CommandOutput> {
        let argv = template::render(command, vars);
        let program = argv
            .first()
            .cloned()
            .ok_or_else(|| CommandError::Empty(command.to_string()))?;
        let output = self.runner.run(&argv, None).await?;
        debug!(%program, code = ?output.code, "command finished");
        output.check(&program)
    }
}

#[async_trait]
impl Router for ShellPorts {
    async fn default_routes(&self) -> CommandResult<Vec<Ipv4Addr>> {
        let out = self.exec(&self.commands.route_show, &[]).await?;
        parse::default_routes(&out.stdout)
    }

    async fn replace_default(&self, gateway: Ipv4Addr) -> CommandResult<()> {
        let gw = gateway.to_string();
        self.exec(&self.commands.route_replace, &[("gateway", &gw)])
            .await
            .map(|_| ())
    }

    async fn delete_route(&self, network: &str, gateway: Ipv4Addr) -> CommandResult<()> {
        let gw = gateway.to_string();
        self.exec(
            &self.commands.route_delete,
            &[("network", network), ("gateway", &gw)],
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl Firewall for ShellPorts {
    async fn flush_state(&self, address: Ipv4Addr) -> CommandResult<()> {
        let addr = address.to_string();
        self.exec(&self.commands.state_flush, &[("address", &addr)])
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl LeaseManager for ShellPorts {
    async fn query(&self, interface: &str) -> CommandResult<Lease> {
        let out = self
            .exec(&self.commands.lease_query, &[("interface", interface)])
            .await?;
        parse::lease(&out.stdout)
    }

    async fn renew(&self, interface: &str) -> CommandResult<()> {
        self.exec(&self.commands.lease_renew, &[("interface", interface)])
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl LinkDialer for ShellPorts {
    async fn bring_up(&self, interface: &str) -> CommandResult<()> {
        self.exec(&self.commands.link_up, &[("interface", interface)])
            .await
            .map(|_| ())
    }

    async fn peer_address(&self, interface: &str) -> CommandResult<Ipv4Addr> {
        let out = self
            .exec(&self.commands.link_query, &[("interface", interface)])
            .await?;
        parse::peer_address(&out.stdout)
    }
}
