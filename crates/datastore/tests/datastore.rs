//! End-to-end coverage against a real Postgres database.
//!
//! Every test is skipped unless `DATABASE_URL` is set.

use std::sync::Arc;
use std::time::Duration;

use freightdeck_core::{AppError, GrantAction, Pattern, PermissionGrant, Principal, Role};
use freightdeck_datastore::records::{
    ActivityRecord, NewShipment, NewTracker, NewUser, ShipmentChanges, ShipmentRecord,
    ShipmentStatus, TrackerRecord, UserRecord,
};
use freightdeck_datastore::{
    ActivityAction, Criteria, Datastore, ListQuery, RepositoryConfig, Sort, with_principal,
};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_datastore() -> Option<Datastore> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for datastore tests: {error}");
    }

    Some(Datastore::new(pool, Principal::system(Uuid::new_v4())))
}

fn new_tracker(tenant_id: Uuid, description: &str) -> NewTracker {
    NewTracker {
        creator_id: Uuid::new_v4(),
        owner_id: Some(tenant_id),
        metrics_ex_id: format!("m-{}", Uuid::new_v4()),
        description: Some(description.to_owned()),
    }
}

fn new_shipment(tenant_id: Uuid) -> NewShipment {
    NewShipment {
        creator_id: Uuid::new_v4(),
        owner_id: Some(tenant_id),
        reference: format!("FD-{}", Uuid::new_v4()),
        status: ShipmentStatus::Pending,
        origin: Some("Hamburg".to_owned()),
        destination: Some("Rotterdam".to_owned()),
    }
}

fn tenant_principal(tenant_id: Uuid, grants: Vec<PermissionGrant>) -> Arc<Principal> {
    Arc::new(Principal::new(
        Uuid::new_v4(),
        tenant_id,
        "Ada",
        Role::Operator,
        grants,
    ))
}

fn shipments_grant(action: Pattern<GrantAction>, tenant_id: Uuid) -> PermissionGrant {
    PermissionGrant {
        action,
        resource_type: Pattern::Exact("shipments".to_owned()),
        resource_id: Pattern::Any,
        owner_id: Pattern::Exact(tenant_id),
    }
}

#[tokio::test]
async fn upsert_keeps_the_row_id_stable() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore.repository::<TrackerRecord>(RepositoryConfig::new("trackers"));
    let tenant_id = Uuid::new_v4();

    let mut input = new_tracker(tenant_id, "AAA");
    let first = repository.create_or_update(&input, &["metrics_ex_id"]).await;
    assert!(first.is_ok());
    let Ok(first) = first else {
        return;
    };

    input.description = Some("ZZZ".to_owned());
    let second = repository.create_or_update(&input, &["metrics_ex_id"]).await;
    assert!(second.is_ok());
    let Ok(second) = second else {
        return;
    };

    assert_eq!(second.id, first.id);
    assert_eq!(second.description.as_deref(), Some("ZZZ"));
}

#[tokio::test]
async fn batch_upsert_merges_conflicting_rows() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore.repository::<TrackerRecord>(RepositoryConfig::new("trackers"));
    let tenant_id = Uuid::new_v4();

    let inputs = vec![new_tracker(tenant_id, "one"), new_tracker(tenant_id, "two")];
    let created = repository.create_all(&inputs).await;
    assert!(created.is_ok());
    let created = created.unwrap_or_default();
    assert_eq!(created.len(), 2);

    let merged = repository
        .create_or_update_all(&inputs, &["metrics_ex_id"])
        .await;
    assert!(merged.is_ok());
    let merged = merged.unwrap_or_default();

    let mut created_ids: Vec<Uuid> = created.iter().map(|row| row.id).collect();
    let mut merged_ids: Vec<Uuid> = merged.iter().map(|row| row.id).collect();
    created_ids.sort_unstable();
    merged_ids.sort_unstable();
    assert_eq!(merged_ids, created_ids);
}

#[tokio::test]
async fn listing_honors_sort_and_tenant_criteria() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore.repository::<TrackerRecord>(RepositoryConfig::new("trackers"));
    let tenant_id = Uuid::new_v4();

    let mut first = new_tracker(tenant_id, "first");
    first.metrics_ex_id = format!("a-{tenant_id}");
    let mut second = new_tracker(tenant_id, "second");
    second.metrics_ex_id = format!("b-{tenant_id}");
    assert!(repository.create(&first).await.is_ok());
    assert!(repository.create(&second).await.is_ok());

    let listed = repository
        .get_all(ListQuery {
            criteria: Criteria::new().field("owner_id", tenant_id),
            sort: Some(Sort::desc("metrics_ex_id")),
            limit: None,
            only_deleted: false,
        })
        .await;
    assert!(listed.is_ok());
    let listed = listed.unwrap_or_default();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].metrics_ex_id, second.metrics_ex_id);
    assert_eq!(listed[1].metrics_ex_id, first.metrics_ex_id);
}

#[tokio::test]
async fn transaction_commits_work_that_succeeds() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore.repository::<TrackerRecord>(RepositoryConfig::new("trackers"));
    let input = new_tracker(Uuid::new_v4(), "committed");

    let created = datastore
        .run_in_transaction(|| async { repository.create(&input).await })
        .await;
    assert!(created.is_ok());
    let Ok(created) = created else {
        return;
    };

    let found = repository.get(created.id).await;
    assert!(found.is_ok_and(|row| row.is_some()));
}

#[tokio::test]
async fn transaction_rolls_back_every_statement_on_failure() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore.repository::<TrackerRecord>(RepositoryConfig::new("trackers"));
    let input = new_tracker(Uuid::new_v4(), "doomed");
    let duplicate = input.clone();

    let outcome = datastore
        .run_in_transaction(|| async {
            repository.create(&input).await?;
            repository.create(&duplicate).await
        })
        .await;
    assert!(matches!(outcome, Err(AppError::Conflict(_))));

    let survived = repository
        .exists(Criteria::new().field("metrics_ex_id", input.metrics_ex_id.as_str()))
        .await;
    assert!(survived.is_ok_and(|found| !found));
}

#[tokio::test]
async fn transaction_rolls_back_when_the_budget_elapses() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore.repository::<TrackerRecord>(RepositoryConfig::new("trackers"));
    let input = new_tracker(Uuid::new_v4(), "slow");

    let outcome = datastore
        .run_in_transaction_with_budget(
            || async {
                let created = repository.create(&input).await;
                assert!(created.is_ok());
                tokio::time::sleep(Duration::from_millis(300)).await;
                created
            },
            Duration::from_millis(100),
        )
        .await;
    assert!(matches!(outcome, Err(AppError::TransactionTimeout(_))));

    let survived = repository
        .exists(Criteria::new().field("metrics_ex_id", input.metrics_ex_id.as_str()))
        .await;
    assert!(survived.is_ok_and(|found| !found));
}

#[tokio::test]
async fn soft_deleted_rows_disappear_from_default_reads() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository =
        datastore.repository::<ShipmentRecord>(RepositoryConfig::new("shipments").soft_delete());
    let tenant_id = Uuid::new_v4();

    let created = repository.create(&new_shipment(tenant_id)).await;
    assert!(created.is_ok());
    let Ok(created) = created else {
        return;
    };

    let removed = repository.remove(created.id).await;
    assert!(removed.is_ok_and(|affected| affected));

    let hidden = repository.get(created.id).await;
    assert!(hidden.is_ok_and(|row| row.is_none()));

    let trashed = repository
        .get_all(ListQuery {
            criteria: Criteria::new().field("owner_id", tenant_id),
            only_deleted: true,
            ..ListQuery::default()
        })
        .await;
    assert!(trashed.is_ok_and(|rows| rows.len() == 1));

    let missing = repository.remove(Uuid::new_v4()).await;
    assert!(missing.is_ok_and(|affected| !affected));
}

#[tokio::test]
async fn update_narrowing_clause_miss_is_a_precondition_failure() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository =
        datastore.repository::<ShipmentRecord>(RepositoryConfig::new("shipments").soft_delete());

    let created = repository.create(&new_shipment(Uuid::new_v4())).await;
    assert!(created.is_ok());
    let Ok(created) = created else {
        return;
    };

    let changes = ShipmentChanges {
        status: Some(ShipmentStatus::Cancelled),
        ..ShipmentChanges::default()
    };
    let denied = repository
        .update(
            created.id,
            &changes,
            Criteria::new().field("status", ShipmentStatus::Delivered.as_str()),
        )
        .await;
    assert!(matches!(denied, Err(AppError::PreconditionFailed(_))));

    let unchanged = repository.get(created.id).await;
    assert!(
        unchanged.is_ok_and(|row| {
            row.is_some_and(|row| row.status == ShipmentStatus::Pending.as_str())
        })
    );

    let accepted = repository
        .update(
            created.id,
            &changes,
            Criteria::new().field("status", ShipmentStatus::Pending.as_str()),
        )
        .await;
    assert!(accepted.is_ok_and(|row| row.status == ShipmentStatus::Cancelled.as_str()));
}

#[tokio::test]
async fn reads_are_filtered_to_granted_tenants() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore
        .repository::<ShipmentRecord>(RepositoryConfig::new("shipments").enforce_permissions());
    let home_tenant = Uuid::new_v4();
    let other_tenant = Uuid::new_v4();

    let visible = repository.create(&new_shipment(home_tenant)).await;
    let hidden = repository.create(&new_shipment(other_tenant)).await;
    assert!(visible.is_ok());
    assert!(hidden.is_ok());
    let (Ok(visible), Ok(hidden)) = (visible, hidden) else {
        return;
    };

    let principal = tenant_principal(
        home_tenant,
        vec![PermissionGrant {
            action: Pattern::Exact(GrantAction::Read),
            resource_type: Pattern::Any,
            resource_id: Pattern::Any,
            owner_id: Pattern::Exact(home_tenant),
        }],
    );
    with_principal(principal, async {
        let found = repository.get(visible.id).await;
        assert!(found.is_ok_and(|row| row.is_some()));

        let filtered = repository.get(hidden.id).await;
        assert!(filtered.is_ok_and(|row| row.is_none()));

        let listed = repository.get_all(ListQuery::default()).await;
        assert!(listed.is_ok());
        let listed = listed.unwrap_or_default();
        assert!(listed.iter().all(|row| row.owner_id == home_tenant));
        assert!(listed.iter().any(|row| row.id == visible.id));
    })
    .await;
}

#[tokio::test]
async fn writes_without_a_matching_grant_are_forbidden() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore
        .repository::<ShipmentRecord>(RepositoryConfig::new("shipments").enforce_permissions());
    let tenant_id = Uuid::new_v4();

    let created = repository.create(&new_shipment(tenant_id)).await;
    assert!(created.is_ok());
    let Ok(created) = created else {
        return;
    };

    let read_only = tenant_principal(
        tenant_id,
        vec![shipments_grant(
            Pattern::Exact(GrantAction::Read),
            tenant_id,
        )],
    );
    with_principal(read_only, async {
        let changes = ShipmentChanges {
            status: Some(ShipmentStatus::InTransit),
            ..ShipmentChanges::default()
        };
        let denied = repository
            .update(created.id, &changes, Criteria::new())
            .await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));

        let denied = repository.remove(created.id).await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));

        let denied = repository.create(&new_shipment(tenant_id)).await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));
    })
    .await;
}

#[tokio::test]
async fn exists_sees_rows_hidden_by_permission_filters() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore
        .repository::<ShipmentRecord>(RepositoryConfig::new("shipments").enforce_permissions());

    let created = repository.create(&new_shipment(Uuid::new_v4())).await;
    assert!(created.is_ok());
    let Ok(created) = created else {
        return;
    };

    let stranger = tenant_principal(Uuid::new_v4(), Vec::new());
    with_principal(stranger, async {
        let filtered = repository.get(created.id).await;
        assert!(filtered.is_ok_and(|row| row.is_none()));

        let found = repository
            .exists(Criteria::new().field("reference", created.reference.as_str()))
            .await;
        assert!(found.is_ok_and(|found| found));
    })
    .await;
}

#[tokio::test]
async fn duplicate_user_email_is_a_conflict() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore.repository::<UserRecord>(RepositoryConfig::new("users"));
    let input = NewUser {
        creator_id: Uuid::new_v4(),
        owner_id: Some(Uuid::new_v4()),
        email: format!("{}@example.com", Uuid::new_v4()),
        role: Role::Customer,
        name: "Mara".to_owned(),
        company_name: "Freightdeck".to_owned(),
        phone: None,
    };

    assert!(repository.create(&input).await.is_ok());
    let duplicate = repository.create(&input).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn upsert_audit_action_defaults_to_update_and_is_configurable() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let activities = datastore.repository::<ActivityRecord>(RepositoryConfig::new("activities"));

    let repository = datastore
        .repository::<TrackerRecord>(RepositoryConfig::new("trackers").record_activity());
    let merged = repository
        .create_or_update(&new_tracker(Uuid::new_v4(), "merged"), &["metrics_ex_id"])
        .await;
    assert!(merged.is_ok());
    let Ok(merged) = merged else {
        return;
    };

    let trail = activities
        .get_by(Criteria::new().field("resource_id", merged.id))
        .await;
    assert!(trail.is_ok());
    let Ok(Some(entry)) = trail else {
        panic!("expected an activity entry for the merged tracker");
    };
    assert_eq!(entry.action, "update");

    let repository = datastore.repository::<TrackerRecord>(
        RepositoryConfig::new("trackers")
            .record_activity()
            .upsert_action(ActivityAction::Upsert),
    );
    let merged = repository
        .create_or_update(&new_tracker(Uuid::new_v4(), "labeled"), &["metrics_ex_id"])
        .await;
    assert!(merged.is_ok());
    let Ok(merged) = merged else {
        return;
    };

    let trail = activities
        .get_by(Criteria::new().field("resource_id", merged.id))
        .await;
    assert!(trail.is_ok());
    let Ok(Some(entry)) = trail else {
        panic!("expected an activity entry for the labeled tracker");
    };
    assert_eq!(entry.action, "upsert");
}

#[tokio::test]
async fn upsert_without_a_create_grant_is_forbidden() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore
        .repository::<ShipmentRecord>(RepositoryConfig::new("shipments").enforce_permissions());
    let tenant_id = Uuid::new_v4();

    let read_only = tenant_principal(
        tenant_id,
        vec![shipments_grant(
            Pattern::Exact(GrantAction::Read),
            tenant_id,
        )],
    );
    with_principal(read_only, async {
        let denied = repository
            .create_or_update(&new_shipment(tenant_id), &["id"])
            .await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));
    })
    .await;
}

#[tokio::test]
async fn activity_rows_roll_back_with_their_mutation() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore
        .repository::<ShipmentRecord>(RepositoryConfig::new("shipments").record_activity());
    let activities = datastore.repository::<ActivityRecord>(RepositoryConfig::new("activities"));
    let tenant_id = Uuid::new_v4();
    let input = new_shipment(tenant_id);
    let principal = tenant_principal(tenant_id, Vec::new());
    let principal_id = principal.id();

    let outcome = with_principal(principal, async {
        datastore
            .run_in_transaction(|| async {
                repository.create(&input).await?;
                Err::<(), AppError>(AppError::Validation("shipment intake aborted".to_owned()))
            })
            .await
    })
    .await;
    assert!(matches!(outcome, Err(AppError::Validation(_))));

    let survived = repository
        .exists(Criteria::new().field("reference", input.reference.as_str()))
        .await;
    assert!(survived.is_ok_and(|found| !found));

    let trail = activities
        .get_by(Criteria::new().field("generator_id", principal_id))
        .await;
    assert!(trail.is_ok_and(|entry| entry.is_none()));
}

#[tokio::test]
async fn mutations_leave_an_attributed_activity_trail() {
    let Some(datastore) = test_datastore().await else {
        return;
    };
    let repository = datastore
        .repository::<ShipmentRecord>(RepositoryConfig::new("shipments").record_activity());
    let activities = datastore.repository::<ActivityRecord>(RepositoryConfig::new("activities"));
    let tenant_id = Uuid::new_v4();
    let principal = tenant_principal(tenant_id, Vec::new());
    let principal_id = principal.id();

    let created = with_principal(principal, async {
        repository.create(&new_shipment(tenant_id)).await
    })
    .await;
    assert!(created.is_ok());
    let Ok(created) = created else {
        return;
    };

    let trail = activities
        .get_by(Criteria::new().field("resource_id", created.id))
        .await;
    assert!(trail.is_ok());
    let Ok(Some(entry)) = trail else {
        panic!("expected an activity entry for the created shipment");
    };
    assert_eq!(entry.action, "create");
    assert_eq!(entry.resource_type, "shipments");
    assert_eq!(entry.generator_id, principal_id);
    assert_eq!(entry.owner_id, tenant_id);
    assert!(entry.description.contains("operator"));
    assert!(entry.description.contains("Ada"));
}
