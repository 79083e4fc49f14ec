//! 资源覆盖与 vApp 属性

use vmops_inventory::{ArrayUpdateOperation, VAppProperty, VAppPropertySpec, VmConfigSpec};

use super::CloneOptions;

/// GiB 转 MB（四舍五入）
pub fn gib_to_mb(gib: f64) -> i64 {
    (gib * 1024.0).round() as i64
}

/// 只包含显式给出的资源覆盖项，未给出的字段保持缺省，远程服务沿用模板原值
pub fn resource_overrides(options: &CloneOptions) -> VmConfigSpec {
    VmConfigSpec {
        num_cpus: options.cpus,
        num_cores_per_socket: options.cores_per_socket,
        memory_mb: options.memory_gb.map(gib_to_mb),
        memory_reservation_mb: options.memory_reservation_gb.map(gib_to_mb),
        annotation: options.annotation.clone(),
        ..Default::default()
    }
}

/// vApp 属性变更：id 完全匹配（区分大小写）时编辑，否则以新 key 追加
pub fn vapp_property_changes(
    existing: &[VAppProperty],
    requested: &[(String, String)],
) -> Vec<VAppPropertySpec> {
    let mut next_key = existing.iter().map(|p| p.key).max().unwrap_or(-1) + 1;
    requested
        .iter()
        .map(|(id, value)| match existing.iter().find(|p| &p.id == id) {
            Some(property) => VAppPropertySpec {
                operation: ArrayUpdateOperation::Edit,
                info: VAppProperty {
                    value: value.clone(),
                    ..property.clone()
                },
            },
            None => {
                let key = next_key;
                next_key += 1;
                VAppPropertySpec {
                    operation: ArrayUpdateOperation::Add,
                    info: VAppProperty {
                        key,
                        id: id.clone(),
                        label: None,
                        value: value.clone(),
                        user_configurable: true,
                    },
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gib_rounding() {
        assert_eq!(gib_to_mb(4.0), 4096);
        assert_eq!(gib_to_mb(1.5), 1536);
        assert_eq!(gib_to_mb(0.0001), 0);
        assert_eq!(gib_to_mb(2.0005), 2049);
    }

    #[test]
    fn test_absent_overrides_stay_absent() {
        let mut options = CloneOptions::new("t", "v");
        options.memory_gb = Some(8.0);
        let spec = resource_overrides(&options);
        assert_eq!(spec.memory_mb, Some(8192));
        assert!(spec.num_cpus.is_none());
        assert!(spec.memory_reservation_mb.is_none());
    }

    #[test]
    fn test_vapp_edit_or_add() {
        let existing = vec![VAppProperty {
            key: 3,
            id: "guestinfo.hostname".into(),
            label: Some("Hostname".into()),
            value: "old".into(),
            user_configurable: true,
        }];
        let changes = vapp_property_changes(
            &existing,
            &[
                ("guestinfo.hostname".into(), "web-01".into()),
                ("GUESTINFO.HOSTNAME".into(), "x".into()),
                ("guestinfo.role".into(), "web".into()),
            ],
        );
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].operation, ArrayUpdateOperation::Edit);
        assert_eq!(changes[0].info.key, 3);
        assert_eq!(changes[0].info.label.as_deref(), Some("Hostname"));
        assert_eq!(changes[1].operation, ArrayUpdateOperation::Add);
        assert_eq!(changes[1].info.key, 4);
        assert_eq!(changes[2].info.key, 5);
    }
}
