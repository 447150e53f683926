//! Integration tests for the permissions store.
//!
//! Runs against an in-memory SQLite database with migrations applied. The
//! key behaviors covered:
//! - permission set round-trips through the bitmap BLOB columns
//! - the repo + pending write commits or rolls back as one unit
//! - staleness queries (no-perms, oldest-perms, metrics)
//! - pending permissions are granted and consumed at account binding

#![cfg(all(feature = "sqlite", feature = "migrate"))]

use chrono::{Duration, Utc};
use permsync::connect_and_migrate;
use permsync::entity::perm_level::PermLevel;
use permsync::entity::{external_account, pending_permissions, repo, user};
use permsync::fetcher::ExternalAccounts;
use permsync::store::perms::{
    RepoPermissions, UserPermissions, get_user_ids_by_external_accounts,
    grant_pending_permissions, list_external_accounts, load_user_permissions,
    permissions_metrics, repo_ids_with_no_perms, set_repo_and_pending_permissions,
    set_repo_permissions, set_user_permissions, user_ids_with_no_perms,
    user_ids_with_oldest_perms,
};
use roaring::RoaringBitmap;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

const SERVICE_TYPE: &str = "gitlab";
const SERVICE_ID: &str = "https://gitlab.example.com/";

async fn setup_db() -> DatabaseConnection {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    connect_and_migrate("sqlite::memory:")
        .await
        .expect("in-memory database")
}

async fn seed_user(db: &DatabaseConnection, id: i64, username: &str) {
    user::ActiveModel {
        id: Set(id),
        username: Set(username.to_string()),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await
    .expect("insert user");
}

async fn seed_repo(db: &DatabaseConnection, id: i64, private: bool) {
    repo::ActiveModel {
        id: Set(id),
        name: Set(format!("repo-{id}")),
        private: Set(private),
        service_type: Set(SERVICE_TYPE.to_string()),
        service_id: Set(SERVICE_ID.to_string()),
        external_id: Set(format!("r{id}")),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await
    .expect("insert repo");
}

async fn seed_account(db: &DatabaseConnection, user_id: i64, account_id: &str) {
    external_account::ActiveModel {
        user_id: Set(user_id),
        service_type: Set(SERVICE_TYPE.to_string()),
        service_id: Set(SERVICE_ID.to_string()),
        account_id: Set(account_id.to_string()),
        created_at: Set(Utc::now().fixed_offset()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert external account");
}

fn accounts(ids: &[&str]) -> ExternalAccounts {
    ExternalAccounts {
        service_type: SERVICE_TYPE.to_string(),
        service_id: SERVICE_ID.to_string(),
        account_ids: ids.iter().map(|s| s.to_string()).collect(),
    }
}

fn bitmap(ids: &[u32]) -> RoaringBitmap {
    ids.iter().copied().collect()
}

#[tokio::test]
async fn user_permissions_roundtrip() {
    let db = setup_db().await;
    seed_user(&db, 1, "alice").await;

    assert!(
        load_user_permissions(&db, 1, PermLevel::Read)
            .await
            .expect("load")
            .is_none(),
        "no row before the first sync"
    );

    let mut perms = UserPermissions::new(1, PermLevel::Read);
    perms.object_ids = bitmap(&[101, 202]);
    let now = Utc::now();
    set_user_permissions(&db, &perms, now).await.expect("set");

    let loaded = load_user_permissions(&db, 1, PermLevel::Read)
        .await
        .expect("load")
        .expect("row exists");
    assert_eq!(loaded.object_ids, bitmap(&[101, 202]));
    let updated_at = loaded.updated_at.expect("stamped");
    assert!((updated_at - now).num_seconds().abs() <= 1);
}

#[tokio::test]
async fn set_user_permissions_is_a_full_overwrite() {
    let db = setup_db().await;
    seed_user(&db, 1, "alice").await;

    let mut perms = UserPermissions::new(1, PermLevel::Read);
    perms.object_ids = bitmap(&[101, 202]);
    set_user_permissions(&db, &perms, Utc::now())
        .await
        .expect("first write");

    perms.object_ids = bitmap(&[303]);
    set_user_permissions(&db, &perms, Utc::now())
        .await
        .expect("second write");

    let loaded = load_user_permissions(&db, 1, PermLevel::Read)
        .await
        .expect("load")
        .expect("row exists");
    assert_eq!(loaded.object_ids, bitmap(&[303]), "old IDs are gone");
}

#[tokio::test]
async fn repo_and_pending_permissions_commit_together() {
    let db = setup_db().await;
    seed_user(&db, 11, "alice").await;
    seed_repo(&db, 5, true).await;

    let mut perms = RepoPermissions::new(5, PermLevel::Read);
    perms.user_ids = bitmap(&[11]);
    set_repo_and_pending_permissions(&db, &perms, &accounts(&["b"]), Utc::now())
        .await
        .expect("combined write");

    let pending = pending_permissions::Entity::find()
        .all(&db)
        .await
        .expect("pending rows");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].account_id, "b");
}

#[tokio::test]
async fn repo_and_pending_permissions_roll_back_together() {
    let db = setup_db().await;
    seed_repo(&db, 5, true).await;

    // A pending row with a garbage bitmap makes the reconciliation fail
    // after the repo-permissions write already happened in the transaction.
    pending_permissions::ActiveModel {
        service_type: Set(SERVICE_TYPE.to_string()),
        service_id: Set(SERVICE_ID.to_string()),
        account_id: Set("corrupt".to_string()),
        permission: Set(PermLevel::Read),
        object_ids: Set(vec![0xde, 0xad]),
        updated_at: Set(Utc::now().fixed_offset()),
        ..Default::default()
    }
    .insert(&db)
    .await
    .expect("seed corrupt pending row");

    let perms = RepoPermissions::new(5, PermLevel::Read);
    set_repo_and_pending_permissions(&db, &perms, &accounts(&["corrupt"]), Utc::now())
        .await
        .expect_err("corrupt bitmap must fail the transaction");

    let repo_row = permsync::entity::repo_permissions::Entity::find_by_id((5_i64, PermLevel::Read))
        .one(&db)
        .await
        .expect("query");
    assert!(repo_row.is_none(), "repo write must have rolled back");
}

#[tokio::test]
async fn pending_reconciliation_adds_and_removes_accounts()
{
    let db = setup_db().await;
    seed_repo(&db, 5, true).await;

    let perms = RepoPermissions::new(5, PermLevel::Read);
    set_repo_and_pending_permissions(&db, &perms, &accounts(&["a", "b"]), Utc::now())
        .await
        .expect("first write");

    // Account "a" got bound elsewhere; only "b" is still pending.
    set_repo_and_pending_permissions(&db, &perms, &accounts(&["b"]), Utc::now())
        .await
        .expect("second write");

    let pending = pending_permissions::Entity::find()
        .all(&db)
        .await
        .expect("pending rows");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].account_id, "b");
}

#[tokio::test]
async fn external_account_lookups() {
    let db = setup_db().await;
    seed_user(&db, 11, "alice").await;
    seed_user(&db, 33, "carol").await;
    seed_account(&db, 11, "a").await;
    seed_account(&db, 33, "c").await;

    let listed = list_external_accounts(&db, 11).await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].account_id, "a");

    let bound = get_user_ids_by_external_accounts(&db, &accounts(&["a", "b", "c"]))
        .await
        .expect("resolve");
    assert_eq!(bound.len(), 2);
    assert_eq!(bound.get("a"), Some(&11));
    assert_eq!(bound.get("c"), Some(&33));
    assert!(!bound.contains_key("b"));

    // A different service never matches.
    let other = ExternalAccounts {
        service_type: SERVICE_TYPE.to_string(),
        service_id: "https://other.example.com/".to_string(),
        account_ids: vec!["a".to_string()],
    };
    assert!(
        get_user_ids_by_external_accounts(&db, &other)
            .await
            .expect("resolve")
            .is_empty()
    );
}

#[tokio::test]
async fn no_perms_queries_exclude_synced_and_public_rows() {
    let db = setup_db().await;
    seed_user(&db, 1, "alice").await;
    seed_user(&db, 2, "bob").await;
    seed_repo(&db, 5, true).await;
    seed_repo(&db, 6, true).await;
    seed_repo(&db, 7, false).await;

    set_user_permissions(&db, &UserPermissions::new(2, PermLevel::Read), Utc::now())
        .await
        .expect("sync user 2");
    set_repo_permissions(&db, &RepoPermissions::new(6, PermLevel::Read), Utc::now())
        .await
        .expect("sync repo 6");

    assert_eq!(user_ids_with_no_perms(&db).await.expect("users"), vec![1]);
    assert_eq!(repo_ids_with_no_perms(&db).await.expect("repos"), vec![5]);
}

#[tokio::test]
async fn oldest_perms_query_orders_and_limits() {
    let db = setup_db().await;
    let base = Utc::now();
    for id in 1..=4_u32 {
        seed_user(&db, i64::from(id), &format!("user-{id}")).await;
        let stamp = base - Duration::hours(i64::from(id));
        set_user_permissions(&db, &UserPermissions::new(id, PermLevel::Read), stamp)
            .await
            .expect("seed perms");
    }

    let oldest = user_ids_with_oldest_perms(&db, 2).await.expect("query");
    assert_eq!(oldest.len(), 2);
    assert!(oldest.contains_key(&4), "oldest row included");
    assert!(oldest.contains_key(&3), "second oldest row included");
}

#[tokio::test]
async fn metrics_report_stale_counts_and_gap() {
    let db = setup_db().await;
    let now = Utc::now();

    seed_user(&db, 1, "alice").await;
    seed_user(&db, 2, "bob").await;
    set_user_permissions(
        &db,
        &UserPermissions::new(1, PermLevel::Read),
        now - Duration::hours(100),
    )
    .await
    .expect("stale row");
    set_user_permissions(&db, &UserPermissions::new(2, PermLevel::Read), now)
        .await
        .expect("fresh row");

    let metrics = permissions_metrics(&db, now, Duration::hours(72))
        .await
        .expect("metrics");
    assert_eq!(metrics.users_with_stale_perms, 1);
    assert_eq!(metrics.repos_with_stale_perms, 0);

    let expected_gap = Duration::hours(100).num_seconds() as f64;
    assert!(
        (metrics.users_perms_gap_seconds - expected_gap).abs() < 2.0,
        "gap was {}",
        metrics.users_perms_gap_seconds
    );
    assert_eq!(metrics.repos_perms_gap_seconds, 0.0);
}

#[tokio::test]
async fn binding_an_account_consumes_pending_permissions() {
    let db = setup_db().await;
    seed_user(&db, 42, "dora").await;
    seed_repo(&db, 5, true).await;

    let perms = RepoPermissions::new(5, PermLevel::Read);
    set_repo_and_pending_permissions(&db, &perms, &accounts(&["dora-ext"]), Utc::now())
        .await
        .expect("record pending");

    grant_pending_permissions(
        &db,
        42,
        SERVICE_TYPE,
        SERVICE_ID,
        "dora-ext",
        PermLevel::Read,
        Utc::now(),
    )
    .await
    .expect("grant");

    let user_perms = load_user_permissions(&db, 42, PermLevel::Read)
        .await
        .expect("load")
        .expect("row exists");
    assert_eq!(user_perms.object_ids, bitmap(&[5]));

    let remaining = pending_permissions::Entity::find()
        .filter(pending_permissions::Column::AccountId.eq("dora-ext"))
        .all(&db)
        .await
        .expect("query");
    assert!(remaining.is_empty(), "pending row consumed");
}
