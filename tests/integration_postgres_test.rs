// ABOUTME: Integration tests against a real PostgreSQL destination
// ABOUTME: Ignored by default; set TEST_TARGET_URL to a database the test user may create tables in

use gradebook_migrator::config::DestinationConfig;
use gradebook_migrator::error::StoreRole;
use gradebook_migrator::migration::{
    default_catalog, repair_table, ColumnDef, ColumnType, Dialect, MigrationRun, RepairOutcome,
    RepairPlan, Store, TableSpec,
};
use gradebook_migrator::{postgres, sqlite};
use rusqlite::Connection;
use std::env;

/// Helper to get the destination URL from environment
fn get_target_config() -> Option<DestinationConfig> {
    let url = env::var("TEST_TARGET_URL").ok()?;
    Some(DestinationConfig {
        url: Some(url),
        ..Default::default()
    })
}

async fn drop_catalog_tables(config: &DestinationConfig) {
    let mut store = postgres::open_store(config).await.unwrap();
    for spec in default_catalog().iter().rev() {
        store
            .execute(&Dialect::Postgres.drop_table(&spec.name, true))
            .await
            .unwrap();
    }
    store.close().await.unwrap();
}

fn small_gradebook(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("school.db");
    let conn = Connection::open(&path).unwrap();
    for spec in default_catalog() {
        if spec.optional {
            continue;
        }
        conn.execute_batch(&Dialect::Sqlite.create_table(&spec, &spec.name, false))
            .unwrap();
    }
    conn.execute_batch(
        "INSERT INTO admin (id, username, password_hash, full_name, is_active) VALUES
            (1, 'root', 'h', 'Root', 1), (2, 'office', 'h', 'Office', 1), (3, 'archive', 'h', 'Archive', 0);
         INSERT INTO teacher (id, username, password_hash, full_name, is_active, created_at) VALUES
            (1, 't1', 'h', 'Teacher One', 1, '2024-09-01 08:00:00'),
            (2, 't2', 'h', 'Teacher Two', 'true', NULL);
         INSERT INTO academic_term (id, name, start_date, end_date, is_current) VALUES
            (1, '2024/2025', '2024-09-02', '2025-06-20', 1);",
    )
    .unwrap();
    path
}

#[tokio::test]
#[ignore]
async fn test_migrate_into_postgres_is_idempotent() {
    let config = get_target_config().expect("TEST_TARGET_URL must be set");
    drop_catalog_tables(&config).await;

    let dir = tempfile::tempdir().unwrap();
    let source_path = small_gradebook(&dir);

    println!("Running first migration...");
    let first = MigrationRun::new(
        sqlite::open_read_only(&source_path, StoreRole::Source).unwrap(),
        postgres::open_store(&config).await.unwrap(),
    )
    .create_schema(true)
    .execute(&default_catalog())
    .await
    .unwrap();
    assert_eq!(first.table("admin").unwrap().rows_inserted, 3);
    assert_eq!(first.table("teacher").unwrap().rows_inserted, 2);
    assert_eq!(first.missing_optional, vec!["passing_grade".to_string()]);

    println!("Running second migration...");
    let second = MigrationRun::new(
        sqlite::open_read_only(&source_path, StoreRole::Source).unwrap(),
        postgres::open_store(&config).await.unwrap(),
    )
    .create_schema(true)
    .execute(&default_catalog())
    .await
    .unwrap();
    assert_eq!(second.total_inserted(), 0);

    let mut store = postgres::open_store(&config).await.unwrap();
    assert_eq!(store.count_rows("admin").await.unwrap(), 3);

    // Enforcement is active again on a fresh session
    let orphan = store
        .execute("INSERT INTO class (id, name, academic_term_id) VALUES (1, '1.a', 999)")
        .await;
    assert!(orphan.is_err());
    store.close().await.unwrap();

    drop_catalog_tables(&config).await;
}

#[tokio::test]
#[ignore]
async fn test_repeated_repair_on_postgres() {
    let config = get_target_config().expect("TEST_TARGET_URL must be set");
    let spec = TableSpec::new("legacy_pupil")
        .column(ColumnDef::required("username", ColumnType::Text).unique());
    let plan = RepairPlan::new(spec.clone(), "class_id");

    let mut store = postgres::open_store(&config).await.unwrap();
    store
        .execute(&Dialect::Postgres.drop_table("legacy_pupil", true))
        .await
        .unwrap();
    store
        .execute(&Dialect::Postgres.create_table(&spec, "legacy_pupil", false))
        .await
        .unwrap();
    store
        .execute("INSERT INTO legacy_pupil (id, username) VALUES (1, 'lea'), (2, 'niko')")
        .await
        .unwrap();

    // The column comes back between rebuilds, so the second one needs a fresh shadow
    for round in 0..2 {
        store
            .execute("ALTER TABLE legacy_pupil ADD COLUMN class_id INTEGER")
            .await
            .unwrap();
        let outcome = repair_table(&mut store, &plan).await.unwrap();
        assert!(
            matches!(outcome, RepairOutcome::Repaired { rows_copied: 2, .. }),
            "round {}",
            round
        );
    }

    let duplicate = store
        .execute("INSERT INTO legacy_pupil (id, username) VALUES (3, 'lea')")
        .await;
    assert!(duplicate.is_err());

    store
        .execute(&Dialect::Postgres.drop_table("legacy_pupil", true))
        .await
        .unwrap();
    store.close().await.unwrap();
}
