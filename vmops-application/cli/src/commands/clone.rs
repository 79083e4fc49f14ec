//! Clone 命令处理

use anyhow::{Context, Result};
use colored::Colorize;
use vmops_orchestrator::{
    clone_vm, plan_clone, with_random_suffix, BootstrapOptions, CloneOptions, IpFamily,
    OrchestratorError, PlacementConstraints,
};

use super::common::{spinner, AppContext};
use super::output::print_json;
use crate::{CloneArgs, IpFamilyArg};

pub async fn handle(app: &AppContext, args: CloneArgs) -> Result<()> {
    let options = clone_options(&args)?;
    let session = app.session().await?;

    if args.dry_run {
        let plan = plan_clone(&session, &options).await?;
        println!(
            "{} 已解析 {} → {} (文件夹 {})",
            "✓".green().bold(),
            plan.template.name.cyan(),
            plan.name.cyan().bold(),
            plan.folder
        );
        print_json(&plan.spec)?;
        return Ok(());
    }

    let bootstrap = bootstrap_options(&args, app.config.readiness.ssh_port);
    let progress = spinner(format!("克隆 {} → {}", options.template, options.name));
    let result = clone_vm(&session, &options, &bootstrap, &app.cancel).await;
    progress.finish_and_clear();

    let report = result.with_context(|| format!("克隆虚拟机 {} 失败", options.name))?;

    if args.format == "json" {
        return print_json(&report);
    }

    if report.already_existed {
        println!(
            "{} 虚拟机 {} 已存在，沿用现有虚拟机",
            "!".yellow().bold(),
            report.name.cyan().bold()
        );
    } else {
        println!(
            "{} 虚拟机 {} 克隆成功",
            "✓".green().bold(),
            report.name.cyan().bold()
        );
    }
    if let Some(vm) = &report.vm {
        println!("  引用: {}", vm.to_string().bright_black());
    }
    for message in &report.customization_messages {
        println!("  定制: {}", message.green());
    }
    if let Some(ip) = &report.ip_address {
        println!("  IP:   {}", ip.yellow());
    }
    if let Some(port) = report.port_ready {
        println!("  端口: {} 可连接", port.to_string().green());
    }
    Ok(())
}

/// 命令行参数转换为克隆选项
fn clone_options(args: &CloneArgs) -> Result<CloneOptions> {
    let name = if args.random_suffix {
        with_random_suffix(&args.name)
    } else {
        args.name.clone()
    };

    Ok(CloneOptions {
        template: args.template.clone(),
        name,
        folder: args.folder.clone(),
        placement: PlacementConstraints {
            host: args.host.clone(),
            pool: args.pool.clone(),
            datastore: args.datastore.clone(),
            datastore_cluster: args.datastore_cluster.clone(),
            networks: args.networks.clone(),
            switches: args.switches.clone(),
        },
        mac_addresses: args.macs.clone(),
        ip_addresses: args.ips.clone(),
        gateways: args.gateways.clone(),
        dns_servers: args.dns_servers.clone(),
        dns_suffixes: args.dns_suffixes.clone(),
        hostname: args.hostname.clone(),
        domain: args.domain.clone(),
        time_zone: args.time_zone.clone(),
        customization_spec: args.customization_spec.clone(),
        disable_customization: args.no_customization,
        cpus: args.cpus,
        cores_per_socket: args.cores_per_socket,
        memory_gb: args.memory,
        memory_reservation_gb: args.memory_reservation,
        annotation: args.annotation.clone(),
        vapp_properties: parse_vapp_properties(&args.vapp_properties)?,
        linked_clone: args.linked,
        thin: args.thin,
        mark_as_template: args.as_template,
        power_on: args.power_on || args.wait || args.wait_ip || args.wait_port.is_some(),
    })
}

fn bootstrap_options(args: &CloneArgs, ssh_port: u16) -> BootstrapOptions {
    let ip_family = match args.ip_family {
        IpFamilyArg::V4 => IpFamily::V4,
        IpFamilyArg::V6 => IpFamily::V6,
        IpFamilyArg::Any => IpFamily::Any,
    };
    if args.wait {
        return BootstrapOptions {
            ip_family,
            port: args.wait_port.or(Some(ssh_port)),
            ..BootstrapOptions::full(ssh_port)
        };
    }
    BootstrapOptions {
        wait_customization: false,
        wait_ip: args.wait_ip,
        ip_family,
        port: args.wait_port,
    }
}

/// 解析 `ID=VALUE` 形式的 vApp 属性
fn parse_vapp_properties(entries: &[String]) -> Result<Vec<(String, String)>> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((id, value)) if !id.trim().is_empty() => {
                Ok((id.trim().to_string(), value.to_string()))
            }
            _ => Err(OrchestratorError::ConstraintViolation(format!(
                "vApp 属性 '{}' 应为 ID=VALUE 形式",
                entry
            ))
            .into()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::Parser;

    fn args(extra: &[&str]) -> CloneArgs {
        let mut argv = vec!["vmops", "clone", "golden-linux", "web-01"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            crate::Commands::Clone(args) => args,
            _ => panic!("应解析为 clone 命令"),
        }
    }

    #[test]
    fn test_vapp_property_parsing() {
        let parsed =
            parse_vapp_properties(&["guestinfo.role=web".into(), "empty=".into()]).unwrap();
        assert_eq!(parsed[0], ("guestinfo.role".into(), "web".into()));
        assert_eq!(parsed[1], ("empty".into(), String::new()));

        let err = parse_vapp_properties(&["no-separator".into()]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_wait_implies_power_on_and_ssh_port() {
        let args = args(&["--wait", "--network", "app-net"]);
        let options = clone_options(&args).unwrap();
        assert!(options.power_on);
        assert_eq!(options.placement.networks, vec!["app-net"]);

        let bootstrap = bootstrap_options(&args, 22);
        assert!(bootstrap.wait_customization);
        assert_eq!(bootstrap.port, Some(22));
    }

    #[test]
    fn test_random_suffix() {
        let options = clone_options(&args(&["--random-suffix"])).unwrap();
        assert!(options.name.starts_with("web-01-"));
        assert_eq!(options.name.len(), "web-01-".len() + 8);
    }

    #[test]
    fn test_no_wait_by_default() {
        let args = args(&[]);
        assert!(!clone_options(&args).unwrap().power_on);
        let bootstrap = bootstrap_options(&args, 22);
        assert!(!bootstrap.wait_ip);
        assert!(bootstrap.port.is_none());
    }
}
