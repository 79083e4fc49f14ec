//! 克隆工作流测试

use tokio_util::sync::CancellationToken;
use vmops_inventory::{
    CustomizationIdentity, DeviceInfo, DeviceOperation, DiskMoveType, FaultKind, InventoryService,
    IpAssignment, ManagedObjectRef, MemoryInventory, NicBacking, ObjectKind, PowerState,
    RemoteFault, TaskOperation, VmSeed,
};
use vmops_orchestrator::*;

const GB: u64 = 1024 * 1024 * 1024;

fn fixture() -> (MemoryInventory, OrchestratorConfig) {
    let inv = MemoryInventory::new();
    let dc = inv.add_datacenter(&inv.root(), "dc1");
    let folders = inv.folders_of(&dc).unwrap();

    let ds = inv.add_datastore(&folders.datastore, "ds-shared", 500 * GB, 1000 * GB);
    let app_net = inv.add_network(&folders.network, "app-net");
    let build_net = inv.add_network(&folders.network, "build-net");

    let cluster = inv.add_cluster(&folders.host, "cluster-a");
    let host = inv.add_host(&cluster, "esx-01", false);
    inv.attach(&host, &ds);
    inv.attach(&host, &app_net);
    inv.attach(&host, &build_net);

    let templates = inv.add_folder(&folders.vm, "templates");
    inv.add_folder(&folders.vm, "prod");
    inv.add_vm(
        &templates,
        VmSeed::linux("golden-linux")
            .template()
            .with_nic(Some((&build_net, "build-net")))
            .with_disk(20),
    );
    inv.add_vm(
        &templates,
        VmSeed::windows("golden-win").template().with_nic(None),
    );

    (inv, OrchestratorConfig::default())
}

fn web01() -> CloneOptions {
    let mut options = CloneOptions::new("golden-linux", "web-01");
    options.placement.networks = vec!["app-net".into()];
    options
}

#[tokio::test]
async fn test_golden_linux_to_web01() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    let plan = plan_clone(&session, &web01()).await.unwrap();
    let spec = &plan.spec;
    assert!(!spec.power_on);
    assert!(!spec.template);

    let changes = &spec.config.as_ref().unwrap().device_change;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].operation, DeviceOperation::Edit);
    match &changes[0].device.info {
        DeviceInfo::Ethernet {
            backing: Some(NicBacking::Network { device_name, network }),
            ..
        } => {
            assert_eq!(device_name, "app-net");
            assert_eq!(Some(network.clone()), inv.lookup(ObjectKind::Network, "app-net"));
        }
        other => panic!("意外设备: {:?}", other),
    }

    match &spec.customization.as_ref().unwrap().identity {
        Some(CustomizationIdentity::LinuxPrep(linux)) => {
            assert_eq!(linux.host_name, "web-01");
            assert_eq!(linux.domain, "");
        }
        other => panic!("意外身份: {:?}", other),
    }

    // 没有 IP 列表时每块网卡一条 DHCP 映射
    let map = &spec.customization.as_ref().unwrap().nic_setting_map;
    assert_eq!(map.len(), 1);
    assert_eq!(map[0].adapter.ip, IpAssignment::Dhcp);

    let report = clone_vm(
        &session,
        &web01(),
        &BootstrapOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(!report.already_existed);
    assert_eq!(report.vm, inv.lookup(ObjectKind::VirtualMachine, "web-01"));
    assert_eq!(inv.submitted().len(), 1);
}

#[tokio::test]
async fn test_datastore_and_cluster_rejected_before_mutation() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    let mut options = web01();
    options.placement.datastore = Some("ds-shared".into());
    options.placement.datastore_cluster = Some("pod-1".into());

    let err = clone_vm(
        &session,
        &options,
        &BootstrapOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, OrchestratorError::ConstraintViolation(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(inv.submitted().is_empty());
}

#[tokio::test]
async fn test_mac_ip_mismatch_rejected() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    let mut options = web01();
    options.mac_addresses = vec!["00:50:56:aa:00:01".into(), "00:50:56:aa:00:02".into()];
    options.ip_addresses = vec!["10.0.0.5/24".into()];

    assert!(matches!(
        plan_clone(&session, &options).await,
        Err(OrchestratorError::ConstraintViolation(_))
    ));
    assert!(inv.submitted().is_empty());
}

#[tokio::test]
async fn test_duplicate_name_is_recovered() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();
    let bootstrap = BootstrapOptions::default();
    let cancel = CancellationToken::new();

    let first = clone_vm(&session, &web01(), &bootstrap, &cancel).await.unwrap();
    let second = clone_vm(&session, &web01(), &bootstrap, &cancel).await.unwrap();

    assert!(!first.already_existed);
    assert!(second.already_existed);
    assert_eq!(first.vm, second.vm);
    assert_eq!(inv.submitted().len(), 2);
}

#[tokio::test]
async fn test_nic_mismatch_is_fatal() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();
    inv.inject_fault(
        "CloneVM_Task",
        RemoteFault::new(
            FaultKind::NicSettingMismatch {
                num_copies_of_nic_mapping: 2,
                num_network_cards: 1,
            },
            "The number of network adapter settings in the customization specification does not match",
        ),
    );

    let mut options = web01();
    options.ip_addresses = vec!["10.0.0.5/24".into(), "10.0.1.5/24".into()];

    let err = clone_vm(
        &session,
        &options,
        &BootstrapOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    match &err {
        OrchestratorError::CustomizationNicMismatch {
            vm_name,
            nic_mapping_count,
            nic_count,
        } => {
            assert_eq!(vm_name, "web-01");
            assert_eq!((*nic_mapping_count, *nic_count), (2, 1));
        }
        other => panic!("意外错误: {:?}", other),
    }
    assert_eq!(err.exit_code(), 6);
    assert!(err.to_string().contains("web-01"));
    // 虚拟机已经创建
    assert!(inv.lookup(ObjectKind::VirtualMachine, "web-01").is_some());
}

#[tokio::test]
async fn test_windows_template_needs_sysprep_item() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    let options = CloneOptions::new("golden-win", "win-01");
    assert!(matches!(
        plan_clone(&session, &options).await,
        Err(OrchestratorError::ConstraintViolation(_))
    ));

    let mut options = CloneOptions::new("golden-win", "win-01");
    options.customization_spec = Some("missing-spec".into());
    assert!(matches!(
        plan_clone(&session, &options).await,
        Err(OrchestratorError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_folder_and_resources() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    let mut options = web01();
    options.folder = Some("prod".into());
    options.cpus = Some(4);
    options.memory_gb = Some(8.0);
    options.annotation = Some("web tier".into());

    let plan = plan_clone(&session, &options).await.unwrap();
    assert_eq!(Some(plan.folder.clone()), inv.lookup(ObjectKind::Folder, "prod"));
    let config = plan.spec.config.unwrap();
    assert_eq!(config.num_cpus, Some(4));
    assert_eq!(config.memory_mb, Some(8192));
    assert!(config.num_cores_per_socket.is_none());

    options.folder = Some("prod/missing".into());
    assert!(matches!(
        plan_clone(&session, &options).await,
        Err(OrchestratorError::PathNotFound { .. })
    ));
}

#[tokio::test]
async fn test_linked_clone_uses_current_snapshot() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    let mut options = web01();
    options.linked_clone = true;
    assert!(matches!(
        plan_clone(&session, &options).await,
        Err(OrchestratorError::ConstraintViolation(_))
    ));

    let template = inv.lookup(ObjectKind::VirtualMachine, "golden-linux").unwrap();
    let handle = inv
        .submit(&TaskOperation::CreateSnapshot {
            vm: template.clone(),
            name: "base".into(),
            description: String::new(),
            memory: false,
            quiesce: false,
        })
        .await
        .unwrap();
    inv.wait_for_task(&handle).await.unwrap();

    let plan = plan_clone(&session, &options).await.unwrap();
    assert!(plan.spec.snapshot.is_some());
    assert_eq!(
        plan.spec.location.disk_move_type,
        Some(DiskMoveType::CreateNewChildDiskBacking)
    );
}

#[tokio::test]
async fn test_bootstrap_waits_for_customization_ip_and_port() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut options = web01();
    options.ip_addresses = vec!["127.0.0.1/8".into()];
    options.power_on = true;

    let bootstrap = BootstrapOptions {
        wait_customization: true,
        wait_ip: true,
        ip_family: IpFamily::V4,
        port: Some(port),
    };
    let report = clone_vm(&session, &options, &bootstrap, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.customization_messages.len(), 1);
    assert_eq!(report.ip_address.as_deref(), Some("127.0.0.1"));
    assert_eq!(report.port_ready, Some(port));

    let vm: ManagedObjectRef = report.vm.unwrap();
    assert_eq!(inv.power_state_of(&vm), Some(PowerState::PoweredOn));
    drop(listener);
}

#[tokio::test]
async fn test_macos_template_not_customized_as_linux() {
    let (inv, config) = fixture();
    let folders = inv
        .folders_of(&inv.lookup(ObjectKind::Datacenter, "dc1").unwrap())
        .unwrap();
    inv.add_vm(
        &folders.vm,
        VmSeed::linux("golden-mac")
            .template()
            .with_guest("darwin18_64Guest", "Apple macOS 10.14 (64-bit)")
            .with_nic(None),
    );
    let session = Session::open(&inv, &config, None).await.unwrap();

    let mut options = CloneOptions::new("golden-mac", "mac-01");
    options.placement.networks = vec!["app-net".into()];
    let err = plan_clone(&session, &options).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Unsupported(_)));
    assert_eq!(err.exit_code(), 4);
    assert!(inv.submitted().is_empty());
}
