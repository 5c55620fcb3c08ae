use tern_orm::{Database, Error, ForeignKey, ManyToMany, Model, OneToMany, Op};

#[derive(Debug, Default, Model)]
struct Brand {
    #[orm(primary_key)]
    id: i32,
    name: Option<String>,
    branches: OneToMany<Branch>,
}

#[derive(Debug, Default, Model)]
struct Branch {
    #[orm(primary_key)]
    id: i32,
    city: Option<String>,
    brand: ForeignKey<Brand>,
}

#[derive(Debug, Default, Model)]
struct Sponsor {
    #[orm(primary_key)]
    id: i32,
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
    name: Option<String>,
    courses: ManyToMany<Course>,
}

#[derive(Debug, Default, Model)]
struct Orphan {
    #[orm(primary_key)]
    id: i32,
    label: Option<String>,
}

#[derive(Debug, Default, Model)]
struct Household {
    #[orm(primary_key)]
    id: i32,
    orphans: OneToMany<Orphan>,
}

async fn setup(foreign_keys: bool) -> Result<Database, Box<dyn std::error::Error>> {
    let _ = env_logger::builder().is_test(true).try_init();
    let db = Database::builder().max_connections(1).foreign_keys(foreign_keys).connect("sqlite::memory:").await?;
    db.migrator()
        .register::<Brand>()
        .register::<Branch>()
        .register::<Sponsor>()
        .register::<Course>()
        .register::<Student>()
        .register::<Orphan>()
        .register::<Household>()
        .run()
        .await?;
    Ok(db)
}

async fn acme(db: &Database) -> Result<Brand, Box<dyn std::error::Error>> {
    let mut brand = Brand { name: Some("Acme".to_string()), ..Default::default() };
    for city in ["Lisbon", "Porto"] {
        let mut branch = Branch { city: Some(city.to_string()), ..Default::default() };
        db.save(&mut branch).await?;
        brand.branches.add(branch);
    }
    Ok(brand)
}

#[tokio::test]
async fn test_one_to_many_children_are_linked_and_saved() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup(true).await?;

    let mut brand = acme(&db).await?;
    brand.branches.add(Branch { city: Some("Braga".to_string()), ..Default::default() });
    assert!(db.save(&mut brand).await?);

    let (saved, unsaved): (Vec<&Branch>, Vec<&Branch>) = brand.branches.values().iter().partition(|b| b.id != 0);
    assert_eq!(saved.len(), 2);
    for branch in saved {
        assert_eq!(branch.brand.id(), brand.id);
    }
    // Never-saved children are not inserted through their owner.
    assert_eq!(unsaved.len(), 1);
    assert_eq!(unsaved[0].brand.id(), 0);

    assert_eq!(db.objects::<Branch>().count().await?, 2);
    let stored = db.objects::<Branch>().filter("brand", Op::Eq, brand.id)?.count().await?;
    assert_eq!(stored, 2);

    let mut loaded = OneToMany::<Branch>::default();
    let cities: Vec<_> = loaded.fetch(&db, &brand).await?.iter().map(|b| b.city.clone()).collect();
    assert_eq!(cities, vec![Some("Lisbon".to_string()), Some("Porto".to_string())]);
    Ok(())
}

#[tokio::test]
async fn test_missing_back_reference_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup(true).await?;

    // Nothing to link, so the missing back reference does not matter.
    let mut empty = Household::default();
    assert!(db.save(&mut empty).await?);

    let mut orphan = Orphan { label: Some("Oliver".to_string()), ..Default::default() };
    db.save(&mut orphan).await?;
    let mut household = Household::default();
    household.orphans.add(orphan);

    let err = db.save(&mut household).await.unwrap_err();
    assert_eq!(household.id, 0);
    assert_eq!(db.objects::<Household>().count().await?, 1);
    assert!(matches!(err, Error::MissingBackReference { target: "Household", origin: "Orphan", .. }));
    assert_eq!(
        err.to_string(),
        r#"No field pointing to Household was found in class Orphan! Choices are: ["label"]"#
    );
    Ok(())
}

#[tokio::test]
async fn test_foreign_keys_resolve_lazily() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup(true).await?;

    let mut brand = acme(&db).await?;
    db.save(&mut brand).await?;

    let mut branch = db.objects::<Branch>().first().await?.ok_or("no branch")?;
    assert_eq!(branch.brand.id(), brand.id);
    assert!(!branch.brand.is_persisted());
    assert!(branch.brand.instance().is_none());

    let owner = branch.brand.get(&db).await?.ok_or("dangling brand")?;
    assert_eq!(owner.name.as_deref(), Some("Acme"));
    assert!(branch.brand.instance().is_some());
    assert!(branch.brand.is_persisted());

    branch.brand.set_id(999);
    assert!(branch.brand.get(&db).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_delete_cascades_or_nulls() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup(true).await?;

    let mut brand = acme(&db).await?;
    db.save(&mut brand).await?;
    let mut sponsor = Sponsor { brand: ForeignKey::from_id(brand.id), ..Default::default() };
    db.save(&mut sponsor).await?;

    assert!(db.delete(&mut brand).await?);
    assert!(brand.branches.is_empty());

    assert_eq!(db.objects::<Branch>().count().await?, 0);
    let sponsor = db.objects::<Sponsor>().get(sponsor.id).await?.ok_or("sponsor was deleted")?;
    assert!(sponsor.brand.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_disabled_foreign_keys_leave_children() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup(false).await?;

    let mut brand = acme(&db).await?;
    db.save(&mut brand).await?;
    db.delete(&mut brand).await?;

    assert_eq!(db.objects::<Branch>().count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_many_to_many_links_saved_targets() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup(true).await?;

    let mut algebra = Course { title: Some("Algebra".to_string()), ..Default::default() };
    let mut logic = Course { title: Some("Logic".to_string()), ..Default::default() };
    db.save(&mut algebra).await?;
    db.save(&mut logic).await?;

    let mut student = Student { name: Some("Kurt".to_string()), ..Default::default() };
    student.courses.add(Course { id: algebra.id, ..Default::default() });
    student.courses.add(Course { id: logic.id, ..Default::default() });
    student.courses.add(Course { title: Some("Unsaved".to_string()), ..Default::default() });
    assert_eq!(student.courses.join_table_name::<Student>(), "course_student");

    assert!(db.save(&mut student).await?);
    assert!(db.save(&mut student).await?);

    let links = db.raw("SELECT count(*) FROM course_student").fetch_one().await?;
    assert_eq!(sqlx::Row::try_get::<i64, _>(&links, 0)?, 2);

    let mut courses = ManyToMany::<Course>::default();
    let titles: Vec<_> = courses.fetch(&db, &student).await?.iter().map(|c| c.title.clone()).collect();
    assert_eq!(titles, vec![Some("Algebra".to_string()), Some("Logic".to_string())]);

    db.delete(&mut algebra).await?;
    assert_eq!(courses.fetch(&db, &student).await?.len(), 1);
    Ok(())
}
