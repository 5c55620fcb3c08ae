use chrono::{NaiveDateTime, Utc};
use tern_orm::{Database, ForeignKey, ManyToMany, Model, OneToMany, Op, Pagination};

#[derive(Model, Debug, Default)]
#[orm(abstract_model)]
struct Audited {
    created_at: Option<NaiveDateTime>,
}

#[derive(Model, Debug, Default)]
struct Author {
    #[orm(primary_key)]
    id: i32,
    #[orm(size = 50)]
    username: Option<String>,
    age: i32,
    posts: OneToMany<Post>,
    #[orm(parent)]
    audit: Audited,
}

#[derive(Model, Debug, Default)]
struct Post {
    #[orm(primary_key)]
    id: i32,
    title: Option<String>,
    content: Option<String>,
    author: ForeignKey<Author>,
    tags: ManyToMany<Tag>,
}

#[derive(Model, Debug, Default)]
struct Tag {
    #[orm(primary_key)]
    id: i32,
    label: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let db = Database::builder().name("tern_demo.db").version(1).open().await?;

    // Run Migrations
    db.migrator().register::<Author>().register::<Post>().register::<Tag>().run().await?;
    log::info!("Database migration completed!");

    let mut rust = Tag { label: Some("rust".to_string()), ..Default::default() };
    db.save(&mut rust).await?;

    let mut post = Post {
        title: Some("Hello World".to_string()),
        content: Some("This is a test post.".to_string()),
        ..Default::default()
    };
    post.tags.add(Tag { id: rust.id, ..Default::default() });
    db.save(&mut post).await?;

    let mut alice = Author {
        username: Some("alice".to_string()),
        age: 30,
        audit: Audited { created_at: Some(Utc::now().naive_utc()) },
        ..Default::default()
    };
    alice.posts.add(post);
    db.save(&mut alice).await?;
    println!("Saved author #{} with {} post(s)", alice.id, alice.posts.len());

    let found = db.objects::<Author>().filter(author_fields::USERNAME, Op::Eq, "alice")?.first().await?;
    println!("Found author: {:?}", found);

    let mut posts = OneToMany::<Post>::default();
    for post in posts.fetch(&db, &alice).await?.iter() {
        let mut tags = ManyToMany::<Tag>::default();
        let labels: Vec<_> = tags.fetch(&db, post).await?.iter().filter_map(|t| t.label.clone()).collect();
        println!("Post: {:?} tagged {:?}", post.title, labels);
    }

    let page = Pagination::new(0, 10).paginate(db.objects::<Author>().order_by("id")?).await?;
    println!("{} author(s) over {} page(s)", page.total, page.total_pages);

    db.drop_all().await?;
    Ok(())
}
