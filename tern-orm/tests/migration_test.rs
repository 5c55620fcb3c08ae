use sqlx::Row;
use tern_orm::{Database, Error, ForeignKey, ManyToMany, Model, OneToMany};

#[derive(Debug, Default, Model)]
struct Brand {
    #[orm(primary_key)]
    id: i32,
    #[orm(size = 50)]
    name: Option<String>,
    branches: OneToMany<Branch>,
}

#[derive(Debug, Default, Model)]
struct Branch {
    #[orm(primary_key)]
    id: i32,
    city: Option<String>,
    #[orm(on_delete = "set_null")]
    brand: ForeignKey<Brand>,
}

#[derive(Debug, Default, Model)]
struct Course {
    #[orm(primary_key)]
    id: i32,
    title: Option<String>,
}

#[derive(Debug, Default, Model)]
struct Student {
    #[orm(primary_key)]
    id: i32,
    courses: ManyToMany<Course>,
}

/// The `person` table as an older release laid it out.
#[derive(Debug, Default, Model)]
struct Person {
    #[orm(primary_key)]
    id: i32,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Default, Model)]
#[orm(abstract_model)]
struct Named {
    name: Option<String>,
}

#[derive(Debug, Default, Model)]
struct Shadowed {
    #[orm(primary_key)]
    id: i32,
    name: Option<String>,
    #[orm(parent)]
    base: Named,
}

#[derive(Debug, Default, Model)]
struct Reserved {
    #[orm(primary_key)]
    key: i32,
    id: i64,
}

#[derive(Debug, Default, Model)]
struct Label {
    #[orm(primary_key)]
    id: i32,
    named: ForeignKey<Named>,
}

#[derive(Debug, Default, Model)]
struct Friendly {
    #[orm(primary_key)]
    id: i32,
    friends: ManyToMany<Friendly>,
}

async fn memory_db() -> Result<Database, Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();
    Ok(Database::builder().max_connections(1).connect("sqlite::memory:").await?)
}

async fn table_sql(db: &Database, table: &str) -> Result<String, Box<dyn std::error::Error>> {
    let row = db.raw("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?").bind(table).fetch_one().await?;
    Ok(row.try_get::<String, _>(0)?)
}

#[tokio::test]
async fn test_migration_creates_tables_and_indexes() -> Result<(), Box<dyn std::error::Error>> {
    let db = memory_db().await?;

    db.migrator().register::<Brand>().register::<Branch>().register::<Student>().register::<Course>().run().await?;

    for table in ["brand", "branch", "student", "course", "course_student"] {
        assert!(db.table_exists(table).await?, "missing table {table}");
    }

    assert_eq!(db.get_table_columns("branch").await?, vec!["id", "city", "brand"]);
    assert_eq!(db.get_table_columns("course_student").await?, vec!["student", "course"]);
    assert!(db.get_table_indexes("branch").await?.contains(&"brand_fk_idx".to_string()));
    assert!(db.get_table_indexes("course_student").await?.contains(&"course_fk_idx".to_string()));

    let branch = table_sql(&db, "branch").await?;
    assert!(branch.contains(
        "(id integer PRIMARY KEY autoincrement, city varchar(255), brand integer, \
         FOREIGN KEY (brand) REFERENCES brand (id) ON DELETE SET NULL)"
    ));
    let brand = table_sql(&db, "brand").await?;
    assert!(brand.contains("(id integer PRIMARY KEY autoincrement, name varchar(50))"));

    Ok(())
}

#[tokio::test]
async fn test_reconciliation_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let db = memory_db().await?;
    db.migrator().register::<Brand>().register::<Branch>().run().await?;

    let before = table_sql(&db, "branch").await?;
    let indexes_before = db.get_table_indexes("branch").await?;

    db.reconcile().await?;
    db.migrator().register::<Brand>().register::<Branch>().run().await?;

    assert_eq!(table_sql(&db, "branch").await?, before);
    assert_eq!(db.get_table_indexes("branch").await?, indexes_before);
    Ok(())
}

#[tokio::test]
async fn test_missing_columns_are_added_without_losing_rows() -> Result<(), Box<dyn std::error::Error>> {
    let db = memory_db().await?;

    db.raw("CREATE TABLE person (id integer PRIMARY KEY autoincrement, name varchar(255), nickname varchar(255))")
        .execute()
        .await?;
    db.raw("INSERT INTO person (name, nickname) VALUES (?, ?)").bind("Ada").bind("countess").execute().await?;

    db.migrator().register::<Person>().run().await?;

    assert_eq!(db.get_table_columns("person").await?, vec!["id", "name", "nickname", "email"]);
    let sql = table_sql(&db, "person").await?;
    assert_eq!(sql.matches("email").count(), 1);

    let ada = db.objects::<Person>().first().await?.ok_or("row lost")?;
    assert_eq!(ada.name.as_deref(), Some("Ada"));
    assert_eq!(ada.email, None);

    // A second pass must not add the column again.
    db.reconcile().await?;
    assert_eq!(table_sql(&db, "person").await?, sql);
    Ok(())
}

#[tokio::test]
async fn test_drop_all_forgets_everything() -> Result<(), Box<dyn std::error::Error>> {
    let db = memory_db().await?;
    db.migrator().register::<Brand>().register::<Branch>().run().await?;

    db.drop_all().await?;

    assert!(!db.table_exists("brand").await?);
    assert!(!db.table_exists("branch").await?);
    assert!(db.models().is_empty());
    assert!(db.foreign_key_constraints());

    let fk = db.raw("PRAGMA foreign_keys").fetch_one().await?;
    assert_eq!(fk.try_get::<i64, _>(0)?, 1);
    Ok(())
}

#[tokio::test]
async fn test_drop_table_recreates_managed_tables() -> Result<(), Box<dyn std::error::Error>> {
    let db = memory_db().await?;
    db.migrator().register::<Course>().run().await?;

    let mut course = Course { title: Some("Algebra".to_string()), ..Default::default() };
    assert!(db.save(&mut course).await?);

    db.drop_table("course").await?;

    assert!(db.table_exists("course").await?);
    assert_eq!(db.objects::<Course>().count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_invalid_models_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let db = memory_db().await?;

    for result in [
        db.migrator().register::<Shadowed>().run().await,
        db.migrator().register::<Reserved>().run().await,
        db.migrator().register::<Friendly>().run().await,
        db.migrator().register::<Named>().run().await,
        db.migrator().register::<Label>().run().await,
    ] {
        assert!(matches!(result, Err(Error::InvalidModel { .. })), "{result:?}");
    }

    assert!(db.models().is_empty());
    assert!(!db.table_exists("shadowed").await?);
    assert!(!db.table_exists("label").await?);
    Ok(())
}

#[tokio::test]
async fn test_schema_version_is_recorded() -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::builder().version(3).connect("sqlite::memory:").await?;

    let row = db.raw("PRAGMA user_version").fetch_one().await?;
    assert_eq!(row.try_get::<i64, _>(0)?, 3);
    Ok(())
}

#[tokio::test]
async fn test_version_upgrade_reconciles_registered_models() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = std::env::temp_dir().join(format!("tern_upgrade_{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let name = path.to_string_lossy().into_owned();

    let db = Database::builder().name(name.as_str()).version(1).register::<Course>().open().await?;
    assert!(db.table_exists("course").await?);
    assert!(!db.table_exists("student").await?);

    // Same version: nothing new is created.
    let db = Database::builder().name(name.as_str()).version(1).register::<Course>().register::<Student>().open().await?;
    assert!(!db.table_exists("student").await?);

    let db = Database::builder().name(name.as_str()).version(2).register::<Course>().register::<Student>().open().await?;
    assert!(db.table_exists("student").await?);
    assert!(db.table_exists("course_student").await?);
    let row = db.raw("PRAGMA user_version").fetch_one().await?;
    assert_eq!(row.try_get::<i64, _>(0)?, 2);

    drop(db);
    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[tokio::test]
async fn test_builder_rejects_invalid_models() -> Result<(), Box<dyn std::error::Error>> {
    let err = Database::builder().register::<Friendly>().connect("sqlite::memory:").await.err().ok_or("accepted self many-to-many")?;
    assert!(matches!(err, Error::InvalidModel { model: "Friendly", .. }));
    Ok(())
}
