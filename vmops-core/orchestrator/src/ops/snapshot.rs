//! 快照工作流

use serde::Serialize;
use tracing::info;
use vmops_inventory::{ManagedObjectRef, PowerState, SnapshotNode, SnapshotTree, TaskOperation};

use super::Session;
use crate::error::{OrchestratorError, Result};
use crate::task::FaultPolicy;

/// 快照树中的一行（先序展开）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub depth: usize,
    pub name: String,
    pub description: String,
    pub created: String,
    pub state: PowerState,
    pub current: bool,
}

/// 先序展开快照树
pub fn flatten(tree: &SnapshotTree) -> Vec<SnapshotEntry> {
    fn push(
        out: &mut Vec<SnapshotEntry>,
        nodes: &[SnapshotNode],
        depth: usize,
        current: Option<&ManagedObjectRef>,
    ) {
        for node in nodes {
            out.push(SnapshotEntry {
                depth,
                name: node.name.clone(),
                description: node.description.clone(),
                created: node.create_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                state: node.state,
                current: current == Some(&node.snapshot),
            });
            push(out, &node.children, depth + 1, current);
        }
    }

    let mut out = Vec::with_capacity(tree.len());
    push(&mut out, &tree.roots, 0, tree.current.as_ref());
    out
}

pub async fn list_snapshots(session: &Session<'_>, vm_name: &str) -> Result<Vec<SnapshotEntry>> {
    let vm = session.find_vm(vm_name).await?;
    let tree = session.inventory.snapshot_tree(&vm.moref).await?;
    Ok(flatten(&tree))
}

pub async fn create_snapshot(
    session: &Session<'_>,
    vm_name: &str,
    name: &str,
    description: &str,
    memory: bool,
    quiesce: bool,
) -> Result<Option<ManagedObjectRef>> {
    let vm = session.find_vm(vm_name).await?;
    info!("为虚拟机 {} 创建快照 {}", vm.name, name);
    let op = TaskOperation::CreateSnapshot {
        vm: vm.moref,
        name: name.to_string(),
        description: description.to_string(),
        memory,
        quiesce,
    };
    let outcome = session
        .driver()
        .submit_and_await(&op, FaultPolicy::strict())
        .await?;
    Ok(outcome.result().cloned())
}

/// 恢复快照；未给出名称时恢复到当前快照
pub async fn revert_snapshot(
    session: &Session<'_>,
    vm_name: &str,
    snapshot: Option<&str>,
) -> Result<()> {
    let vm = session.find_vm(vm_name).await?;
    let op = match snapshot {
        Some(name) => {
            let tree = session.inventory.snapshot_tree(&vm.moref).await?;
            let node = find_unique(&tree, &vm.name, name)?;
            info!("虚拟机 {} 恢复到快照 {}", vm.name, name);
            TaskOperation::RevertToSnapshot {
                snapshot: node.snapshot.clone(),
            }
        }
        None => {
            info!("虚拟机 {} 恢复到当前快照", vm.name);
            TaskOperation::RevertToCurrentSnapshot { vm: vm.moref }
        }
    };
    session
        .driver()
        .submit_and_await(&op, FaultPolicy::strict())
        .await?;
    Ok(())
}

pub async fn delete_snapshot(
    session: &Session<'_>,
    vm_name: &str,
    name: &str,
    remove_children: bool,
) -> Result<()> {
    let vm = session.find_vm(vm_name).await?;
    let tree = session.inventory.snapshot_tree(&vm.moref).await?;
    let node = find_unique(&tree, &vm.name, name)?;
    info!("删除虚拟机 {} 的快照 {}", vm.name, name);
    let op = TaskOperation::RemoveSnapshot {
        snapshot: node.snapshot.clone(),
        remove_children,
    };
    session
        .driver()
        .submit_and_await(&op, FaultPolicy::strict())
        .await?;
    Ok(())
}

/// 快照名在树中必须唯一
fn find_unique<'t>(tree: &'t SnapshotTree, vm: &str, name: &str) -> Result<&'t SnapshotNode> {
    let matches = tree.find_all_by_name(name);
    match matches.as_slice() {
        [] => Err(OrchestratorError::NotFound(format!(
            "虚拟机 '{}' 没有快照 '{}'",
            vm, name
        ))),
        [node] => Ok(*node),
        many => Err(OrchestratorError::ConstraintViolation(format!(
            "虚拟机 '{}' 有 {} 个名为 '{}' 的快照",
            vm,
            many.len(),
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vmops_inventory::ObjectKind;

    fn node(id: &str, name: &str, children: Vec<SnapshotNode>) -> SnapshotNode {
        SnapshotNode {
            snapshot: ManagedObjectRef::new(ObjectKind::VirtualMachineSnapshot, id),
            name: name.into(),
            description: String::new(),
            create_time: Utc::now(),
            state: PowerState::PoweredOff,
            children,
        }
    }

    #[test]
    fn test_flatten_marks_current_and_depth() {
        let tree = SnapshotTree {
            current: Some(ManagedObjectRef::new(ObjectKind::VirtualMachineSnapshot, "s2")),
            roots: vec![
                node("s1", "base", vec![node("s2", "patched", vec![])]),
                node("s3", "other", vec![]),
            ],
        };
        let rows = flatten(&tree);
        assert_eq!(rows.len(), 3);
        assert_eq!((rows[0].depth, rows[0].current), (0, false));
        assert_eq!(rows[1].name, "patched");
        assert_eq!((rows[1].depth, rows[1].current), (1, true));
        assert_eq!(rows[2].depth, 0);
    }

    #[test]
    fn test_duplicate_snapshot_names_are_ambiguous() {
        let tree = SnapshotTree {
            current: None,
            roots: vec![node("s1", "daily", vec![node("s2", "daily", vec![])])],
        };
        assert!(matches!(
            find_unique(&tree, "vm", "daily"),
            Err(OrchestratorError::ConstraintViolation(_))
        ));
        assert!(matches!(
            find_unique(&tree, "vm", "weekly"),
            Err(OrchestratorError::NotFound(_))
        ));
    }
}
