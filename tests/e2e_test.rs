//! # 端到端集成测试
//!
//! 通过 ManagementAgent 测试管理层的完整工作流程：
//! - 空图 → 安装模块 → 快照与字段裁剪
//! - 监控启动 → 事件产生 → 通知按序到达 → 停止后静默
//! - 服务查询与错误场景（过滤表达式错误、实体不存在）
//! - 权限边界

use std::collections::BTreeMap;
use std::sync::Arc;

use chips_management::management::{ModuleField, PermissionManager};
use chips_management::module::{namespace, Capability};
use chips_management::{
    status_code, ErrorKind, ManagementAgent, ManagementConfig, ManagementError, ModuleDescriptor,
    ModuleRegistry, ModuleState, Notification, PropertyValue,
};
use tokio::sync::broadcast::Receiver;

// ============================================================================
// 测试辅助
// ============================================================================

fn agent() -> (ModuleRegistry, ManagementAgent) {
    let registry = ModuleRegistry::new();
    let agent = ManagementAgent::new(ManagementConfig::default(), Arc::new(registry.clone()))
        .unwrap()
        .with_permissions(PermissionManager::in_memory());
    (registry, agent)
}

fn drain(rx: &mut Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

// ============================================================================
// 目录查询
// ============================================================================

#[test]
fn test_empty_graph_then_demo_module() {
    let (registry, agent) = agent();
    assert!(agent.modules().list().unwrap().is_empty());

    registry
        .install(ModuleDescriptor::new("demo", "1.0.0", "file:demo.jar"))
        .unwrap();

    let modules = agent.modules().list().unwrap();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].symbolic_name, "demo");
    assert_eq!(modules[0].version, "1.0.0");
    assert_eq!(modules[0].state, ModuleState::Installed);

    let records = agent.modules().list_with_mask(1).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].fields(), vec![ModuleField::Id]);
    assert_eq!(records[0].get(ModuleField::Id), Some(&serde_json::json!(modules[0].id)));

    let json = serde_json::to_value(&records[0]).unwrap();
    assert_eq!(json, serde_json::json!({ "id": modules[0].id }));
}

#[test]
fn test_snapshot_json_shape() {
    let (registry, agent) = agent();
    let id = registry
        .install(ModuleDescriptor::new("demo", "1.0.0", "file:demo.jar"))
        .unwrap();

    let json = serde_json::to_value(agent.modules().get(id).unwrap()).unwrap();
    for key in [
        "id",
        "symbolicName",
        "version",
        "location",
        "state",
        "startLevel",
        "persistentlyStarted",
        "activationPolicyUsed",
        "fragment",
        "removalPending",
        "required",
        "headers",
        "exportedPackages",
        "importedPackages",
        "fragmentIds",
        "hostIds",
        "requiredModuleIds",
        "requiringModuleIds",
        "registeredServiceIds",
        "servicesInUseIds",
        "lastModified",
    ] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(json["headers"]["Bundle-SymbolicName"], "demo");
}

#[test]
fn test_full_workflow_with_wiring_and_services() {
    let (registry, agent) = agent();
    let api = registry
        .install(
            ModuleDescriptor::new("org.demo.api", "1.0.0", "file:api.jar")
                .export_package("org.demo.api", "1.0.0")
                .capability(Capability::named(namespace::MODULE, "org.demo.api")),
        )
        .unwrap();
    let app = registry
        .install(
            ModuleDescriptor::new("org.demo.app", "1.0.0", "file:app.jar")
                .import_package("org.demo.api"),
        )
        .unwrap();
    registry.wire(app, api, namespace::PACKAGE).unwrap();
    registry.start(api).unwrap();
    registry.start(app).unwrap();

    let sid = registry
        .register_service(
            api,
            &["org.demo.api.Greeter"],
            BTreeMap::from([("lang".to_string(), PropertyValue::String("en".into()))]),
        )
        .unwrap();
    registry.get_service(app, sid).unwrap();

    let api_snapshot = agent.modules().get(api).unwrap();
    assert_eq!(api_snapshot.state, ModuleState::Active);
    assert!(api_snapshot.required);
    assert_eq!(api_snapshot.registered_service_ids, vec![sid]);

    let app_snapshot = agent.modules().get(app).unwrap();
    assert_eq!(app_snapshot.imported_packages, vec!["org.demo.api;1.0.0".to_string()]);
    assert_eq!(app_snapshot.services_in_use_ids, vec![sid]);

    let services = agent
        .services()
        .list_filtered(Some("org.demo.api.Greeter"), Some("(lang=en)"))
        .unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].using_module_ids, vec![app]);

    let records = agent
        .services()
        .list_filtered_fields(None, None, ["id", "usingModuleIds"])
        .unwrap();
    let json = serde_json::to_value(&records).unwrap();
    assert_eq!(json, serde_json::json!([{ "id": sid, "usingModuleIds": [app] }]));
}

// ============================================================================
// 事件转发
// ============================================================================

#[test]
fn test_notifications_follow_graph_changes() {
    let (registry, agent) = agent();
    let mut rx = agent.subscribe();
    agent.start().unwrap();

    let n = 6;
    for i in 0..n {
        registry
            .install(ModuleDescriptor::new(format!("m{}", i), "1.0.0", "file:m"))
            .unwrap();
    }

    let seen = drain(&mut rx);
    assert_eq!(seen.len(), n);
    let sequences: Vec<u64> = seen.iter().map(|n| n.sequence).collect();
    assert_eq!(sequences, (0..n as u64).collect::<Vec<_>>());

    // 通知中的模块在目录中可查
    for notification in &seen {
        let snapshot = agent.modules().get(notification.module_id()).unwrap();
        assert_eq!(snapshot.id, notification.module_id());
    }

    agent.stop().unwrap();
    registry
        .install(ModuleDescriptor::new("late", "1.0.0", "file:late"))
        .unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_dropping_agent_detaches_listeners() {
    let registry = ModuleRegistry::new();
    let mut rx = {
        let agent =
            ManagementAgent::new(ManagementConfig::default(), Arc::new(registry.clone())).unwrap();
        let rx = agent.subscribe();
        agent.start().unwrap();
        rx
    };

    registry
        .install(ModuleDescriptor::new("after", "1.0.0", "file:after"))
        .unwrap();
    assert!(drain(&mut rx).is_empty());
}

// ============================================================================
// 错误场景
// ============================================================================

#[test]
fn test_malformed_filter_is_invalid_argument() {
    let (registry, agent) = agent();
    let id = registry
        .install(ModuleDescriptor::new("demo", "1.0.0", "file:demo.jar"))
        .unwrap();
    registry
        .register_service(id, &["org.demo.Greeter"], BTreeMap::new())
        .unwrap();

    for bad in ["(lang=en", "lang=en)", "(&(a=1)(b=2)", "(|)", "(=x)"] {
        let err = agent
            .services()
            .list_filtered(Some("org.demo.Greeter"), Some(bad))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "filter {:?}", bad);
        assert_eq!(err.status_code(), status_code::BAD_REQUEST);
    }
}

#[test]
fn test_not_found_errors() {
    let (_, agent) = agent();
    let err = agent.modules().get(99).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.status_code(), status_code::NOT_FOUND);

    assert!(matches!(
        agent.services().get(99),
        Err(ManagementError::ServiceNotFound(99))
    ));
    assert!(agent.modules().list_with_mask(0).unwrap_err().is_invalid_argument());
}

// ============================================================================
// 权限边界
// ============================================================================

#[test]
fn test_permissions_by_location() {
    let (registry, agent) = agent();
    let id = registry
        .install(ModuleDescriptor::new("demo", "1.0.0", "file:demo.jar"))
        .unwrap();
    let location = agent.modules().location(id).unwrap();

    let permissions = agent.permissions().unwrap();
    permissions
        .set_permissions(&location, &[r#"(org.demo.FilePermission "/tmp/-" "read")"#])
        .unwrap();
    assert_eq!(permissions.list_locations(), vec![location.clone()]);
    assert_eq!(
        permissions.permissions(&location).unwrap(),
        Some(vec![r#"(org.demo.FilePermission "/tmp/-" "read")"#.to_string()])
    );

    let err = permissions
        .set_permissions(&location, &["(ok)", "broken"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(permissions.permissions(&location).unwrap().unwrap().len(), 1);
}
