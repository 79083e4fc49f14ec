//! 迁移、网络、快照、磁盘、电源、列表工作流测试

use tokio_util::sync::CancellationToken;
use vmops_inventory::{
    DeviceInfo, DeviceOperation, DvsInfo, FileOperation, InventoryService, MemoryInventory,
    MovePriority, NicBacking, ObjectKind, PowerState, TaskOperation, VmSeed,
};
use vmops_orchestrator::ops::{disk, listing, network, power, snapshot};
use vmops_orchestrator::*;

const GB: u64 = 1024 * 1024 * 1024;

fn fixture() -> (MemoryInventory, OrchestratorConfig) {
    let inv = MemoryInventory::new();
    let dc = inv.add_datacenter(&inv.root(), "dc1");
    let folders = inv.folders_of(&dc).unwrap();

    let ds1 = inv.add_datastore(&folders.datastore, "ds-01", 100 * GB, 500 * GB);
    let ds2 = inv.add_datastore(&folders.datastore, "ds-02", 300 * GB, 500 * GB);
    let pod = inv.add_storage_pod(&folders.datastore, "pod-fast");
    let pod_a = inv.add_datastore(&pod, "fast-a", 10 * GB, 100 * GB);
    let pod_b = inv.add_datastore(&pod, "fast-b", 40 * GB, 100 * GB);

    let net = inv.add_network(&folders.network, "app-net");
    let dvs = DvsInfo {
        uuid: "50 0a 11 22".into(),
        name: "dvs-prod".into(),
    };
    let pg = inv.add_portgroup(&folders.network, "app-net", dvs, "dvportgroup-10");

    let cluster = inv.add_cluster(&folders.host, "cluster-a");
    let h1 = inv.add_host(&cluster, "esx-01", false);
    let h2 = inv.add_host(&cluster, "esx-02", false);
    for host in [&h1, &h2] {
        for object in [&ds1, &ds2, &pod_a, &pod_b, &net, &pg] {
            inv.attach(host, object);
        }
    }
    inv.add_resource_pool(&cluster, "batch");

    let prod = inv.add_folder(&folders.vm, "prod");
    inv.add_folder(&prod, "web");
    inv.add_vm(
        &prod,
        VmSeed::linux("web-01")
            .with_nic(Some((&net, "app-net")))
            .with_nic(None)
            .with_disk(20)
            .on_host(&h1),
    );
    inv.add_vm(&prod, VmSeed::linux("web-02").template());

    (inv, OrchestratorConfig::default())
}

fn last_reconfigure(inv: &MemoryInventory) -> vmops_inventory::VmConfigSpec {
    match inv.submitted().last() {
        Some(TaskOperation::Reconfigure { spec, .. }) => spec.clone(),
        other => panic!("意外操作: {:?}", other),
    }
}

#[tokio::test]
async fn test_migrate_to_host_and_datastore() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    let options = MigrateOptions {
        vm: "web-01".into(),
        host: Some("esx-02".into()),
        datastore: Some("ds-02".into()),
        priority: MovePriority::High,
        ..Default::default()
    };
    migrate_vm(&session, &options).await.unwrap();

    match inv.submitted().last() {
        Some(TaskOperation::Relocate { spec, priority, .. }) => {
            assert_eq!(spec.host, inv.lookup(ObjectKind::HostSystem, "esx-02"));
            assert_eq!(spec.datastore, inv.lookup(ObjectKind::Datastore, "ds-02"));
            let cluster = inv.lookup(ObjectKind::ClusterComputeResource, "cluster-a").unwrap();
            assert_eq!(spec.pool, Some(inv.root_pool_of(&cluster).unwrap()));
            assert!(spec.disk_move_type.is_none());
            assert_eq!(*priority, MovePriority::High);
        }
        other => panic!("意外操作: {:?}", other),
    }
}

#[tokio::test]
async fn test_migrate_to_datastore_cluster_only() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    let options = MigrateOptions {
        vm: "web-01".into(),
        datastore_cluster: Some("pod-fast".into()),
        ..Default::default()
    };
    migrate_vm(&session, &options).await.unwrap();
    match inv.submitted().last() {
        Some(TaskOperation::Relocate { spec, .. }) => {
            assert!(spec.host.is_none());
            assert!(spec.pool.is_none());
            assert_eq!(spec.datastore, inv.lookup(ObjectKind::Datastore, "fast-b"));
        }
        other => panic!("意外操作: {:?}", other),
    }
}

#[tokio::test]
async fn test_migrate_cluster_member_must_be_visible_from_current_host() {
    let (inv, config) = fixture();
    // fast-c 空间最大，但只有 esx-02 挂载；web-01 在 esx-01 上
    let pod = inv.lookup(ObjectKind::StoragePod, "pod-fast").unwrap();
    let fast_c = inv.add_datastore(&pod, "fast-c", 80 * GB, 100 * GB);
    let esx02 = inv.lookup(ObjectKind::HostSystem, "esx-02").unwrap();
    inv.attach(&esx02, &fast_c);
    let session = Session::open(&inv, &config, None).await.unwrap();

    let options = MigrateOptions {
        vm: "web-01".into(),
        datastore_cluster: Some("pod-fast".into()),
        ..Default::default()
    };
    let spec = relocate_spec(&session, &options).await.unwrap();
    assert_eq!(spec.datastore, inv.lookup(ObjectKind::Datastore, "fast-b"));

    let options = MigrateOptions {
        host: Some("esx-02".into()),
        ..options
    };
    let spec = relocate_spec(&session, &options).await.unwrap();
    assert_eq!(spec.datastore, Some(fast_c));
}

#[tokio::test]
async fn test_set_network_with_switch() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    network::set_network(&session, "web-01", 2, "app-net", Some("dvs-prod"))
        .await
        .unwrap();
    let spec = last_reconfigure(&inv);
    assert_eq!(spec.device_change.len(), 1);
    let change = &spec.device_change[0];
    assert_eq!(change.operation, DeviceOperation::Edit);
    assert_eq!(change.device.key, 4001);
    match &change.device.info {
        DeviceInfo::Ethernet {
            backing: Some(NicBacking::DistributedPort { portgroup_key, .. }),
            ..
        } => assert_eq!(portgroup_key, "dvportgroup-10"),
        other => panic!("意外设备: {:?}", other),
    }

    assert!(matches!(
        network::set_network(&session, "web-01", 3, "app-net", None).await,
        Err(OrchestratorError::ConstraintViolation(_))
    ));
    assert!(matches!(
        network::set_network(&session, "web-01", 1, "app-net", Some("dvs-missing")).await,
        Err(OrchestratorError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_disconnect_nic() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    network::set_connected(&session, "web-01", 1, false).await.unwrap();
    let nics = network::list_nics(&session, "web-01").await.unwrap();
    assert_eq!(nics.len(), 2);
    assert_eq!(nics[0].connectable.map(|c| c.connected), Some(false));
}

#[tokio::test]
async fn test_snapshot_lifecycle() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    snapshot::create_snapshot(&session, "web-01", "base", "clean install", false, false)
        .await
        .unwrap();
    snapshot::create_snapshot(&session, "web-01", "patched", "", false, true)
        .await
        .unwrap();

    let rows = snapshot::list_snapshots(&session, "web-01").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].name, "patched");
    assert_eq!(rows[1].depth, 1);
    assert!(rows[1].current);

    snapshot::revert_snapshot(&session, "web-01", Some("base")).await.unwrap();
    let rows = snapshot::list_snapshots(&session, "web-01").await.unwrap();
    assert!(rows[0].current);

    snapshot::revert_snapshot(&session, "web-01", None).await.unwrap();

    snapshot::delete_snapshot(&session, "web-01", "base", true).await.unwrap();
    assert!(snapshot::list_snapshots(&session, "web-01").await.unwrap().is_empty());

    assert!(matches!(
        snapshot::delete_snapshot(&session, "web-01", "base", false).await,
        Err(OrchestratorError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_disk_add_extend_remove() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    disk::add_disk(&session, "web-01", 50.0, true, Some("ds-02")).await.unwrap();
    let spec = last_reconfigure(&inv);
    assert_eq!(spec.device_change[0].operation, DeviceOperation::Add);
    assert_eq!(spec.device_change[0].file_operation, Some(FileOperation::Create));
    assert_eq!(spec.device_change[0].device.unit_number, Some(1));

    let disks = disk::list_disks(&session, "web-01").await.unwrap();
    assert_eq!(disks.len(), 2);
    assert!((disks[1].capacity_gb - 50.0).abs() < 1e-9);

    assert!(matches!(
        disk::extend_disk(&session, "web-01", 1, 10.0).await,
        Err(OrchestratorError::ConstraintViolation(_))
    ));
    disk::extend_disk(&session, "web-01", 1, 40.0).await.unwrap();
    let disks = disk::list_disks(&session, "web-01").await.unwrap();
    assert!((disks[0].capacity_gb - 40.0).abs() < 1e-9);

    disk::remove_disk(&session, "web-01", 2, true).await.unwrap();
    let spec = last_reconfigure(&inv);
    assert_eq!(spec.device_change[0].file_operation, Some(FileOperation::Destroy));
    assert_eq!(disk::list_disks(&session, "web-01").await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_power_transitions() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();
    let cancel = CancellationToken::new();
    let vm = inv.lookup(ObjectKind::VirtualMachine, "web-01").unwrap();

    let outcome = power::power(
        &session,
        "web-01",
        PowerAction::On,
        Some(std::time::Duration::from_secs(60)),
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(outcome, PowerOutcome::Changed);
    assert_eq!(inv.power_state_of(&vm), Some(PowerState::PoweredOn));

    let submitted = inv.submitted().len();
    let outcome = power::power(&session, "web-01", PowerAction::On, None, &cancel)
        .await
        .unwrap();
    assert_eq!(outcome, PowerOutcome::AlreadyInState);
    assert_eq!(inv.submitted().len(), submitted);

    power::power(&session, "web-01", PowerAction::Suspend, None, &cancel)
        .await
        .unwrap();
    assert_eq!(inv.power_state_of(&vm), Some(PowerState::Suspended));

    assert!(matches!(
        power::power(&session, "web-01", PowerAction::Reset, None, &cancel).await,
        Err(OrchestratorError::ConstraintViolation(_))
    ));
    assert!(matches!(
        power::power(&session, "web-02", PowerAction::On, None, &cancel).await,
        Err(OrchestratorError::Unsupported(_))
    ));
}

#[tokio::test]
async fn test_listing() {
    let (inv, config) = fixture();
    let session = Session::open(&inv, &config, None).await.unwrap();

    let vms = listing::list_vms(&session, Some("^web-")).await.unwrap();
    assert_eq!(vms.len(), 1);
    assert_eq!(vms[0].name, "web-01");
    let templates = listing::list_templates(&session, None).await.unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].name, "web-02");

    assert_eq!(listing::list_hosts(&session, None).await.unwrap().len(), 2);
    assert_eq!(listing::list_datastores(&session, None).await.unwrap().len(), 4);
    assert_eq!(
        listing::max_free_datastore(&session, Some("^ds-")).await.unwrap().name,
        "ds-02"
    );
    assert!(matches!(
        listing::max_free_datastore(&session, Some("^nfs-")).await,
        Err(OrchestratorError::NotFound(_))
    ));

    let clusters = listing::list_datastore_clusters(&session).await.unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].members.len(), 2);
    assert_eq!(clusters[0].free_space, 50 * GB);

    assert_eq!(listing::list_networks(&session, None).await.unwrap().len(), 2);

    let folders: Vec<String> = listing::list_folders(&session)
        .await
        .unwrap()
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    assert_eq!(folders, vec!["/prod".to_string(), "/prod/web".to_string()]);

    let pools: Vec<String> = listing::list_pools(&session)
        .await
        .unwrap()
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    assert!(pools.contains(&"/cluster-a/Resources/batch".to_string()));

    assert!(matches!(
        listing::list_vms(&session, Some("(")).await,
        Err(OrchestratorError::ConstraintViolation(_))
    ));
    assert!(inv.customization_spec_names().await.unwrap().is_empty());
}
