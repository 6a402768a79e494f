// Integration tests for deriving policy rows from permissions and roles
//
// These tests verify:
// 1. Tuples are regenerated idempotently and actions lowercased on write
// 2. Domain expansion and role-model gating
// 3. Validation runs before any row is changed
// 4. Role changes keep grouping rows in sync
// 5. Filtered loads only read the rows a model can use

mod helpers;

use casbin::{Adapter, Filter, Model};
use gatekeeper::authz::adapter::SeaOrmAdapter;
use gatekeeper::authz::{get_policies, CompiledModel, PermissionRule};
use gatekeeper::entities::policy_model;
use gatekeeper::object::{permission, policy_model as models, PolicyModel};
use helpers::{PermissionBuilder, RoleBuilder, TestDb};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, Set, Statement};

const DOMAIN_MODEL: &str = r#"[request_definition]
r = sub, dom, obj, act

[policy_definition]
p = sub, dom, obj, act

[role_definition]
g = _, _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub, r.dom) && r.dom == p.dom && r.obj == p.obj && r.act == p.act
"#;

const ACL_MODEL: &str = r#"[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
"#;

async fn add_model(db: &DatabaseConnection, name: &str, text: &str) {
    let model = PolicyModel {
        owner: "org".to_string(),
        name: name.to_string(),
        model_text: text.to_string(),
        ..Default::default()
    };
    assert!(models::add_model(db, &model)
        .await
        .expect("Failed to add model"));
}

async fn table_exists(db: &DatabaseConnection, table: &str) -> bool {
    let stmt = Statement::from_sql_and_values(
        DbBackend::Sqlite,
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
        [sea_orm::Value::from(table)],
    );
    db.query_one(stmt)
        .await
        .expect("Failed to query schema")
        .is_some()
}

#[tokio::test]
async fn test_add_permission_lowercases_actions() {
    let test_db = TestDb::new().await;
    let sync = test_db.synchronizer();
    let engine = test_db.engine();

    let p = PermissionBuilder::new("read-data")
        .user("org/alice")
        .resource("data1")
        .action("Read")
        .build();
    assert!(sync.add_permission(&p).await.expect("Failed to add permission"));

    let allowed = engine
        .enforce(&PermissionRule::request("org/read-data", "org/alice", "data1", "read"))
        .await
        .expect("Failed to enforce");
    assert!(allowed);

    // Requests are compared as given
    let mixed_case = engine
        .enforce(&PermissionRule::request("org/read-data", "org/alice", "data1", "Read"))
        .await
        .expect("Failed to enforce");
    assert!(!mixed_case);

    let enforcer = test_db.factory().build(&p).await.expect("Failed to build enforcer");
    assert_eq!(
        enforcer.policies(),
        vec![vec!["org/alice", "data1", "read", "allow", "", "org/read-data"]]
    );
}

#[tokio::test]
async fn test_duplicate_add_is_rejected() {
    let test_db = TestDb::new().await;
    let sync = test_db.synchronizer();

    let p = PermissionBuilder::new("p1")
        .user("org/alice")
        .resource("data1")
        .action("read")
        .build();

    assert!(sync.add_permission(&p).await.expect("Failed to add permission"));
    assert!(!sync.add_permission(&p).await.expect("Failed to add permission"));
}

#[tokio::test]
async fn test_update_regenerates_idempotently() {
    let test_db = TestDb::new().await;
    let sync = test_db.synchronizer();

    let p = PermissionBuilder::new("p1")
        .user("org/alice")
        .resource("data1")
        .action("read")
        .action("write")
        .build();
    sync.add_permission(&p).await.expect("Failed to add permission");

    for _ in 0..2 {
        assert!(sync
            .update_permission("org/p1", &p)
            .await
            .expect("Failed to update permission"));
    }

    let enforcer = test_db.factory().build(&p).await.expect("Failed to build enforcer");
    assert_eq!(enforcer.policies(), get_policies(&p));
}

#[tokio::test]
async fn test_update_replaces_old_tuples() {
    let test_db = TestDb::new().await;
    let sync = test_db.synchronizer();
    let engine = test_db.engine();

    let p = PermissionBuilder::new("p1")
        .user("org/alice")
        .resource("data1")
        .action("read")
        .build();
    sync.add_permission(&p).await.expect("Failed to add permission");

    let updated = PermissionBuilder::new("p1")
        .user("org/bob")
        .resource("data1")
        .action("read")
        .build();
    sync.update_permission("org/p1", &updated)
        .await
        .expect("Failed to update permission");

    let alice = engine
        .enforce(&PermissionRule::request("org/p1", "org/alice", "data1", "read"))
        .await
        .expect("Failed to enforce");
    let bob = engine
        .enforce(&PermissionRule::request("org/p1", "org/bob", "data1", "read"))
        .await
        .expect("Failed to enforce");
    assert!(!alice);
    assert!(bob);
}

#[tokio::test]
async fn test_update_missing_permission_returns_false() {
    let test_db = TestDb::new().await;
    let sync = test_db.synchronizer();

    let p = PermissionBuilder::new("ghost")
        .user("org/alice")
        .resource("data1")
        .action("read")
        .build();

    assert!(!sync
        .update_permission("org/ghost", &p)
        .await
        .expect("Failed to update permission"));
}

#[tokio::test]
async fn test_domain_expansion() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();
    let sync = test_db.synchronizer();
    add_model(db, "domain-rbac", DOMAIN_MODEL).await;

    let p = PermissionBuilder::new("tenant-access")
        .model("domain-rbac")
        .user("org/alice")
        .resource("data1")
        .action("read")
        .action("write")
        .domain("tenant1")
        .domain("tenant2")
        .build();
    sync.add_permission(&p).await.expect("Failed to add permission");

    let enforcer = test_db.factory().build(&p).await.expect("Failed to build enforcer");
    let policies = enforcer.policies();
    assert_eq!(policies.len(), 4);
    assert!(policies.iter().all(|r| r[5] == "org/tenant-access"));

    let allowed = test_db
        .engine()
        .enforce(
            &PermissionRule::request("org/tenant-access", "org/alice", "tenant2", "data1")
                .with_v3("write"),
        )
        .await
        .expect("Failed to enforce");
    assert!(allowed);
}

#[tokio::test]
async fn test_roles_cleared_without_role_definition() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();
    let sync = test_db.synchronizer();
    add_model(db, "acl", ACL_MODEL).await;

    let p = PermissionBuilder::new("acl-perm")
        .model("acl")
        .user("org/alice")
        .role("org/admin")
        .resource("data1")
        .action("read")
        .build();
    sync.add_permission(&p).await.expect("Failed to add permission");

    let stored = permission::get_permission(db, "org/acl-perm")
        .await
        .expect("Failed to load permission")
        .expect("Permission not found");
    assert!(stored.roles.is_empty());

    let enforcer = test_db.factory().build(&p).await.expect("Failed to build enforcer");
    assert_eq!(enforcer.policies().len(), 1);
    assert!(enforcer.grouping_policies().is_empty());
}

#[tokio::test]
async fn test_update_clears_roles_without_role_definition() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();
    let sync = test_db.synchronizer();
    add_model(db, "acl", ACL_MODEL).await;

    sync.add_role(&RoleBuilder::new("admin").user("org/bob").build())
        .await
        .expect("Failed to add role");
    let p = PermissionBuilder::new("gated")
        .user("org/alice")
        .role("org/admin")
        .resource("data1")
        .action("read")
        .build();
    sync.add_permission(&p).await.expect("Failed to add permission");

    let mut moved = p.clone();
    moved.model = "acl".to_string();
    assert!(sync
        .update_permission("org/gated", &moved)
        .await
        .expect("Failed to update permission"));

    let stored = permission::get_permission(db, "org/gated")
        .await
        .expect("Failed to load permission")
        .expect("Permission not found");
    assert!(stored.roles.is_empty());

    let enforcer = test_db
        .factory()
        .build(&stored)
        .await
        .expect("Failed to build enforcer");
    assert_eq!(enforcer.policies().len(), 1);
    assert!(enforcer.grouping_policies().is_empty());
}

#[tokio::test]
async fn test_validation_failure_changes_nothing() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();
    let sync = test_db.synchronizer();

    let p = PermissionBuilder::new("p1")
        .user("org/alice")
        .resource("data1")
        .action("read")
        .build();
    sync.add_permission(&p).await.expect("Failed to add permission");

    // Parses, but the matcher reads a request field that does not exist
    let broken = policy_model::ActiveModel {
        owner: Set("org".to_string()),
        name: Set("broken".to_string()),
        created_time: Set(String::new()),
        display_name: Set(String::new()),
        description: Set(String::new()),
        model_text: Set(ACL_MODEL.replace(
            "m = r.sub == p.sub",
            "m = r.dom == p.sub && r.sub == p.sub",
        )),
    };
    policy_model::Entity::insert(broken)
        .exec(db)
        .await
        .expect("Failed to insert model");

    let mut changed = p.clone();
    changed.model = "broken".to_string();
    changed.users = vec!["org/bob".to_string()];

    let result = sync.update_permission("org/p1", &changed).await;
    assert!(result.is_err());

    let stored = permission::get_permission(db, "org/p1")
        .await
        .expect("Failed to load permission")
        .expect("Permission not found");
    assert_eq!(stored.model, "");
    assert_eq!(stored.users, vec!["org/alice"]);

    let enforcer = test_db.factory().build(&p).await.expect("Failed to build enforcer");
    assert_eq!(enforcer.policies(), get_policies(&p));
}

#[tokio::test]
async fn test_delete_permission_drops_private_table() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();
    let sync = test_db.synchronizer();

    let p = PermissionBuilder::new("private")
        .adapter("private_rules")
        .user("org/alice")
        .resource("data1")
        .action("read")
        .build();
    sync.add_permission(&p).await.expect("Failed to add permission");
    assert!(table_exists(db, "private_rules").await);

    assert!(sync
        .delete_permission("org/private")
        .await
        .expect("Failed to delete permission"));
    assert!(!table_exists(db, "private_rules").await);
    assert!(table_exists(db, "permission_rule").await);
}

#[tokio::test]
async fn test_delete_permission_removes_tuples() {
    let test_db = TestDb::new().await;
    let sync = test_db.synchronizer();

    let p = PermissionBuilder::new("p1")
        .user("org/alice")
        .resource("data1")
        .action("read")
        .build();
    sync.add_permission(&p).await.expect("Failed to add permission");
    sync.delete_permission("org/p1")
        .await
        .expect("Failed to delete permission");

    let enforcer = test_db.factory().build(&p).await.expect("Failed to build enforcer");
    assert!(enforcer.policies().is_empty());
    assert!(enforcer.grouping_policies().is_empty());
}

#[tokio::test]
async fn test_role_members_and_nested_roles() {
    let test_db = TestDb::new().await;
    let sync = test_db.synchronizer();
    let engine = test_db.engine();

    sync.add_role(&RoleBuilder::new("ops").user("org/dave").build())
        .await
        .expect("Failed to add role");
    sync.add_role(
        &RoleBuilder::new("admin")
            .user("org/bob")
            .nested("org/ops")
            .build(),
    )
    .await
    .expect("Failed to add role");

    let p = PermissionBuilder::new("admin-access")
        .role("org/admin")
        .resource("data1")
        .action("write")
        .build();
    sync.add_permission(&p).await.expect("Failed to add permission");

    for user in ["org/bob", "org/dave"] {
        let allowed = engine
            .enforce(&PermissionRule::request("org/admin-access", user, "data1", "write"))
            .await
            .expect("Failed to enforce");
        assert!(allowed, "{} should be allowed", user);
    }
}

#[tokio::test]
async fn test_update_role_resyncs_membership() {
    let test_db = TestDb::new().await;
    let sync = test_db.synchronizer();
    let engine = test_db.engine();

    sync.add_role(&RoleBuilder::new("admin").user("org/bob").build())
        .await
        .expect("Failed to add role");
    let p = PermissionBuilder::new("admin-access")
        .role("org/admin")
        .resource("data1")
        .action("write")
        .build();
    sync.add_permission(&p).await.expect("Failed to add permission");

    sync.update_role("org/admin", &RoleBuilder::new("admin").user("org/carol").build())
        .await
        .expect("Failed to update role");

    let bob = engine
        .enforce(&PermissionRule::request("org/admin-access", "org/bob", "data1", "write"))
        .await
        .expect("Failed to enforce");
    let carol = engine
        .enforce(&PermissionRule::request("org/admin-access", "org/carol", "data1", "write"))
        .await
        .expect("Failed to enforce");
    assert!(!bob);
    assert!(carol);
}

#[tokio::test]
async fn test_rename_role_updates_permission_references() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();
    let sync = test_db.synchronizer();
    let engine = test_db.engine();

    sync.add_role(&RoleBuilder::new("admin").user("org/bob").build())
        .await
        .expect("Failed to add role");
    let p = PermissionBuilder::new("admin-access")
        .role("org/admin")
        .resource("data1")
        .action("write")
        .build();
    sync.add_permission(&p).await.expect("Failed to add permission");

    sync.update_role("org/admin", &RoleBuilder::new("superuser").user("org/bob").build())
        .await
        .expect("Failed to update role");

    let stored = permission::get_permission(db, "org/admin-access")
        .await
        .expect("Failed to load permission")
        .expect("Permission not found");
    assert_eq!(stored.roles, vec!["org/superuser"]);

    let allowed = engine
        .enforce(&PermissionRule::request("org/admin-access", "org/bob", "data1", "write"))
        .await
        .expect("Failed to enforce");
    assert!(allowed);
}

#[tokio::test]
async fn test_delete_role_keeps_other_tuples() {
    let test_db = TestDb::new().await;
    let sync = test_db.synchronizer();
    let engine = test_db.engine();

    sync.add_role(&RoleBuilder::new("admin").user("org/bob").build())
        .await
        .expect("Failed to add role");
    let p = PermissionBuilder::new("mixed")
        .user("org/alice")
        .role("org/admin")
        .resource("data1")
        .action("read")
        .build();
    sync.add_permission(&p).await.expect("Failed to add permission");

    assert!(sync.delete_role("org/admin").await.expect("Failed to delete role"));

    let alice = engine
        .enforce(&PermissionRule::request("org/mixed", "org/alice", "data1", "read"))
        .await
        .expect("Failed to enforce");
    let bob = engine
        .enforce(&PermissionRule::request("org/mixed", "org/bob", "data1", "read"))
        .await
        .expect("Failed to enforce");
    assert!(alice);
    assert!(!bob);
}

#[tokio::test]
async fn test_moving_permissions_drops_table_once_unused() {
    let test_db = TestDb::new().await;
    let db = test_db.connection();
    let sync = test_db.synchronizer();

    for (name, user) in [("a", "org/alice"), ("b", "org/bob")] {
        let p = PermissionBuilder::new(name)
            .adapter("shared_rules")
            .user(user)
            .resource("data1")
            .action("read")
            .build();
        sync.add_permission(&p).await.expect("Failed to add permission");
    }
    assert!(table_exists(db, "shared_rules").await);

    for name in ["a", "b"] {
        let mut moved = permission::get_permission(db, &format!("org/{}", name))
            .await
            .expect("Failed to load permission")
            .expect("Permission not found");
        moved.adapter = String::new();
        assert!(sync
            .update_permission(&format!("org/{}", name), &moved)
            .await
            .expect("Failed to update permission"));

        // Kept while `b` still stores rows there
        assert_eq!(table_exists(db, "shared_rules").await, name == "a");
    }
    assert!(table_exists(db, "permission_rule").await);

    let engine = test_db.engine();
    let allowed = engine
        .enforce(&PermissionRule::request("org/b", "org/bob", "data1", "read"))
        .await
        .expect("Failed to enforce");
    assert!(allowed);
}

#[tokio::test]
async fn test_filtered_load_skips_grouping_rows_without_filter() {
    let test_db = TestDb::new().await;

    let mut adapter = SeaOrmAdapter::new(test_db.connection().clone(), "permission_rule")
        .await
        .expect("Failed to create adapter");
    let row = |values: [&str; 6]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
    adapter
        .add_policy("p", "p", row(["org/alice", "data1", "read", "allow", "", "org/p1"]))
        .await
        .expect("Failed to add policy row");
    adapter
        .add_policy("g", "g", row(["org/bob", "org/admin", "", "", "", "org/p2"]))
        .await
        .expect("Failed to add grouping row");

    let model = CompiledModel::built_in().await.expect("Failed to compile model");
    let anchor = vec!["", "", "", "", "", "org/p1"];

    let mut without_roles = model.to_casbin().await.expect("Failed to build model");
    adapter
        .load_filtered_policy(
            &mut without_roles,
            Filter {
                p: anchor.clone(),
                g: Vec::new(),
            },
        )
        .await
        .expect("Failed to load policy");
    assert_eq!(without_roles.get_policy("p", "p").len(), 1);
    assert!(without_roles.get_policy("g", "g").is_empty());

    let mut with_roles = model.to_casbin().await.expect("Failed to build model");
    adapter
        .load_filtered_policy(
            &mut with_roles,
            Filter {
                p: anchor,
                g: vec!["", "", "", "", "", "org/p2"],
            },
        )
        .await
        .expect("Failed to load policy");
    assert_eq!(with_roles.get_policy("g", "g").len(), 1);
}
