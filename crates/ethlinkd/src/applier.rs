//! Network applier
//!
//! Imperative link, address, route, lease client and resolver changes.
//! Every operation reports whether the OS invocation succeeded; callers
//! decide whether that matters.

use crate::config::EthlinkdConfig;
use crate::types::StaticConfig;
use async_trait::async_trait;
use ethlink_common::shell::{self, shellquote};
use ethlink_common::{EthError, EthResult};
use std::fmt::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Write side of interface configuration
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkApplier: Send + Sync {
    async fn bring_up(&self, device: &str) -> EthResult<()>;

    async fn bring_down(&self, device: &str) -> EthResult<()>;

    /// Assign the address, install the default route when a gateway is set
    /// and write the resolver file when at least one DNS server is set.
    async fn apply_static(&self, device: &str, config: &StaticConfig) -> EthResult<()>;

    /// Replace any running lease client with a fresh background one
    async fn apply_dhcp(&self, device: &str) -> EthResult<()>;

    /// Stop the lease client and remove every address
    async fn flush(&self, device: &str) -> EthResult<()>;
}

/// Applier driving `ip` and the DHCP client through the shell
pub struct ShellApplier {
    ip_cmd: String,
    dhcp_cmd: String,
    resolv_conf: PathBuf,

    #[cfg(test)]
    mock_mode: bool,

    /// Captured shell commands in mock mode.
    #[cfg(test)]
    captured_commands: parking_lot::Mutex<Vec<String>>,
}

impl ShellApplier {
    pub fn new(config: &EthlinkdConfig) -> Self {
        Self {
            ip_cmd: config.commands.ip.clone(),
            dhcp_cmd: config.commands.dhcp_client.clone(),
            resolv_conf: config.paths.resolv_conf.clone(),
            #[cfg(test)]
            mock_mode: false,
            #[cfg(test)]
            captured_commands: parking_lot::Mutex::new(Vec::new()),
        }
    }

    #[cfg(test)]
    pub fn new_mock(config: &EthlinkdConfig) -> Self {
        let mut applier = Self::new(config);
        applier.mock_mode = true;
        applier
    }

    /// Run a command, mapping a spawn failure or nonzero exit to `ApplyFailed`
    async fn run(&self, operation: &str, device: &str, cmd: String) -> EthResult<()> {
        #[cfg(test)]
        if self.mock_mode {
            self.captured_commands.lock().push(cmd);
            return Ok(());
        }

        match shell::run(&cmd).await {
            Ok(out) if out.succeeded() => Ok(()),
            Ok(out) => Err(EthError::apply_failed(
                operation,
                device,
                format!("exit code {}: {}", out.status, out.diagnostic()),
            )),
            Err(e) => Err(EthError::apply_failed(operation, device, e.to_string())),
        }
    }

    /// Run a command whose failure is expected and only worth a debug line
    async fn run_quiet(&self, operation: &str, device: &str, cmd: String) {
        if let Err(e) = self.run(operation, device, format!("{} >/dev/null 2>&1", cmd)).await {
            debug!(device, operation, error = %e, "Ignoring failure");
        }
    }

    async fn stop_lease_client(&self, device: &str) {
        let cmd = format!("{} -x {}", self.dhcp_cmd, shellquote(device));
        self.run_quiet("stop lease client", device, cmd).await;
    }

    async fn write_resolver(&self, device: &str, config: &StaticConfig) -> EthResult<()> {
        let body = render_resolver(config);

        #[cfg(test)]
        if self.mock_mode {
            self.captured_commands
                .lock()
                .push(format!("write {}", self.resolv_conf.display()));
            return Ok(());
        }

        tokio::fs::write(&self.resolv_conf, body).await.map_err(|e| {
            EthError::apply_failed(
                "write resolver",
                device,
                format!("{}: {}", self.resolv_conf.display(), e),
            )
        })
    }
}

#[async_trait]
impl NetworkApplier for ShellApplier {
    async fn bring_up(&self, device: &str) -> EthResult<()> {
        let cmd = format!("{} link set dev {} up", self.ip_cmd, shellquote(device));
        self.run("bring up", device, cmd).await
    }

    async fn bring_down(&self, device: &str) -> EthResult<()> {
        let cmd = format!("{} link set dev {} down", self.ip_cmd, shellquote(device));
        self.run("bring down", device, cmd).await
    }

    async fn apply_static(&self, device: &str, config: &StaticConfig) -> EthResult<()> {
        let dev = shellquote(device);
        let mut first_error = None;

        let cmd = format!(
            "{} addr replace {} dev {}",
            self.ip_cmd,
            shellquote(&config.cidr()),
            dev
        );
        if let Err(e) = self.run("assign address", device, cmd).await {
            warn!(device, error = %e, "Address assignment failed");
            first_error.get_or_insert(e);
        }

        if let Some(gateway) = config.gateway {
            let cmd = format!(
                "{} route replace default via {} dev {}",
                self.ip_cmd,
                shellquote(&gateway.to_string()),
                dev
            );
            if let Err(e) = self.run("install default route", device, cmd).await {
                warn!(device, error = %e, "Default route install failed");
                first_error.get_or_insert(e);
            }
        }

        if config.dns_servers.is_empty() {
            debug!(device, "No DNS servers configured, leaving resolver untouched");
        } else if let Err(e) = self.write_resolver(device, config).await {
            warn!(device, error = %e, "Resolver update failed");
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(device, address = %config.cidr(), "Applied static configuration");
                Ok(())
            }
        }
    }

    async fn apply_dhcp(&self, device: &str) -> EthResult<()> {
        let dev = shellquote(device);
        self.stop_lease_client(device).await;
        self.run_quiet("release lease", device, format!("{} -r {}", self.dhcp_cmd, dev))
            .await;

        let cmd = format!("{} -nw {}", self.dhcp_cmd, dev);
        self.run("start lease client", device, cmd).await?;
        info!(device, "Started DHCP client");
        Ok(())
    }

    async fn flush(&self, device: &str) -> EthResult<()> {
        self.stop_lease_client(device).await;
        let cmd = format!("{} addr flush dev {}", self.ip_cmd, shellquote(device));
        self.run("flush addresses", device, cmd).await?;
        debug!(device, "Flushed addresses");
        Ok(())
    }
}

/// Resolver file body: optional `search` line then one `nameserver` per server
pub fn render_resolver(config: &StaticConfig) -> String {
    let mut body = String::new();
    if let Some(domain) = &config.dns_domain {
        let _ = writeln!(body, "search {}", domain);
    }
    for server in &config.dns_servers {
        let _ = writeln!(body, "nameserver {}", server);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn static_config() -> StaticConfig {
        StaticConfig::new(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(255, 255, 255, 0))
            .with_gateway(Ipv4Addr::new(10, 0, 0, 1))
    }

    fn captured(applier: &ShellApplier) -> Vec<String> {
        applier.captured_commands.lock().clone()
    }

    #[tokio::test]
    async fn test_bring_up_and_down() {
        let applier = ShellApplier::new_mock(&EthlinkdConfig::default());
        applier.bring_up("eth0").await.unwrap();
        applier.bring_down("eth0").await.unwrap();

        let cmds = captured(&applier);
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0], "/sbin/ip link set dev \"eth0\" up");
        assert!(cmds[1].ends_with(" down"));
    }

    #[tokio::test]
    async fn test_apply_static_without_dns() {
        let applier = ShellApplier::new_mock(&EthlinkdConfig::default());
        applier.apply_static("eth0", &static_config()).await.unwrap();

        let cmds = captured(&applier);
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].contains("addr replace \"10.0.0.5/24\" dev \"eth0\""));
        assert!(cmds[1].contains("route replace default via \"10.0.0.1\""));
    }

    #[tokio::test]
    async fn test_apply_static_with_dns_writes_resolver() {
        let applier = ShellApplier::new_mock(&EthlinkdConfig::default());
        let config = StaticConfig::new(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(255, 0, 0, 0))
            .with_dns_server("1.1.1.1".parse().unwrap());
        applier.apply_static("eth0", &config).await.unwrap();

        let cmds = captured(&applier);
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].contains("10.0.0.5/8"));
        assert_eq!(cmds[1], "write /etc/resolv.conf");
    }

    #[tokio::test]
    async fn test_apply_dhcp_replaces_client() {
        let applier = ShellApplier::new_mock(&EthlinkdConfig::default());
        applier.apply_dhcp("eth0").await.unwrap();

        let cmds = captured(&applier);
        assert_eq!(cmds.len(), 3);
        assert!(cmds[0].starts_with("/sbin/dhclient -x \"eth0\""));
        assert!(cmds[1].starts_with("/sbin/dhclient -r \"eth0\""));
        assert_eq!(cmds[2], "/sbin/dhclient -nw \"eth0\"");
    }

    #[tokio::test]
    async fn test_flush_stops_client_then_flushes() {
        let applier = ShellApplier::new_mock(&EthlinkdConfig::default());
        applier.flush("eth0").await.unwrap();

        let cmds = captured(&applier);
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].contains("-x"));
        assert_eq!(cmds[1], "/sbin/ip addr flush dev \"eth0\"");
    }

    #[tokio::test]
    async fn test_failed_command_is_apply_failed() {
        let mut config = EthlinkdConfig::default();
        config.commands.ip = "false".to_string();
        let applier = ShellApplier::new(&config);

        let err = applier.bring_up("eth0").await.unwrap_err();
        assert!(matches!(err, EthError::ApplyFailed { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_render_resolver() {
        let config = static_config()
            .with_dns_server("1.1.1.1".parse().unwrap())
            .with_dns_server("8.8.8.8".parse().unwrap())
            .with_dns_domain("lab.local");
        assert_eq!(
            render_resolver(&config),
            "search lab.local\nnameserver 1.1.1.1\nnameserver 8.8.8.8\n"
        );
    }
}
