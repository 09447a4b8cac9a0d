#![allow(dead_code)]

use std::sync::Arc;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, QueryFilter, RelationTrait, Schema, Select};
use where_assoc::{SchemaRegistry, WhereAssocResult};

pub mod user {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub name: String,
        pub is_admin: bool,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_one = "super::profile::Entity")]
        Profile,
    }

    impl Related<super::profile::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Profile.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod profile {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "profiles")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub user_id: i32,
        pub bio: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::user::Entity",
            from = "Column::UserId",
            to = "super::user::Column::Id"
        )]
        User,
    }

    impl Related<super::user::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::User.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod post {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "posts")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub author_id: i32,
        pub title: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::comment::Entity")]
        Comments,
    }

    impl Related<super::comment::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Comments.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod comment {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "comments")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub post_id: i32,
        pub author_id: i32,
        pub is_reported: bool,
        pub body: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "super::post::Entity",
            from = "Column::PostId",
            to = "super::post::Column::Id"
        )]
        Post,
    }

    impl Related<super::post::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Post.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod tag {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "tags")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub name: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod post_tag {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "posts_tags")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub post_id: i32,
        #[sea_orm(primary_key, auto_increment = false)]
        pub tag_id: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod picture {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "pictures")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub imageable_id: i32,
        pub imageable_type: String,
        pub caption: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod category {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "categories")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub parent_id: Option<i32>,
        pub name: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

fn build_registry() -> WhereAssocResult<SchemaRegistry> {
    SchemaRegistry::builder()
        .entity::<user::Entity>("User", |e| {
            e.has_many("posts", "Post", "author_id")
                .has_many("comments", "Comment", "author_id")
                .relation("profile", "Profile", user::Relation::Profile.def())
                .has_many_as("pictures", "Picture", "imageable")
                .scope("admins", |s| {
                    let admin = s.col("is_admin");
                    s.filter(admin.eq(true))
                })
        })
        .entity::<profile::Entity>("Profile", |e| {
            e.relation("user", "User", profile::Relation::User.def()).scope("greeting", |s| {
                let bio = s.col("bio");
                s.filter(bio.eq("hi"))
            })
        })
        .entity::<post::Entity>("Post", |e| {
            e.belongs_to("author", "User", "author_id")
                .relation("comments", "Comment", post::Relation::Comments.def())
                .has_many("reported_comments", "Comment", "post_id")
                .with_scope(|s| {
                    let reported = s.col("is_reported");
                    s.filter(reported.eq(true))
                })
                .has_and_belongs_to_many("tags", "Tag", "posts_tags", "post_id", "tag_id")
                .has_many_as("pictures", "Picture", "imageable")
        })
        .entity::<comment::Entity>("Comment", |e| {
            e.relation("post", "Post", comment::Relation::Post.def())
                .belongs_to("author", "User", "author_id")
                .scope("reported", |s| {
                    let reported = s.col("is_reported");
                    s.filter(reported.eq(true))
                })
        })
        .entity::<tag::Entity>("Tag", |e| {
            e.has_and_belongs_to_many("posts", "Post", "posts_tags", "tag_id", "post_id")
        })
        .entity::<picture::Entity>("Picture", |e| {
            e.belongs_to_polymorphic("imageable", "imageable", &["Post", "User"])
        })
        .entity::<category::Entity>("Category", |e| {
            e.has_many("children", "Category", "parent_id")
                .belongs_to("parent", "Category", "parent_id")
        })
        .build()
}

/// The registry shared by every test in the binary.
pub fn registry() -> Arc<SchemaRegistry> {
    SchemaRegistry::get_or_install(build_registry).unwrap()
}

pub async fn setup_test_db() -> DatabaseConnection {
    let _ = env_logger::builder().is_test(true).try_init();
    registry();

    let db = Database::connect("sqlite::memory:").await.unwrap();
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut tables = vec![
        schema.create_table_from_entity(user::Entity),
        schema.create_table_from_entity(profile::Entity),
        schema.create_table_from_entity(post::Entity),
        schema.create_table_from_entity(comment::Entity),
        schema.create_table_from_entity(tag::Entity),
        schema.create_table_from_entity(post_tag::Entity),
        schema.create_table_from_entity(picture::Entity),
        schema.create_table_from_entity(category::Entity),
    ];
    for table in tables.iter_mut() {
        db.execute(backend.build(table.if_not_exists())).await.unwrap();
    }

    seed(&db).await;
    db
}

// Fixture rows. Traps are noted where a broken correlation would leak rows.
async fn seed(db: &DatabaseConnection) {
    let statements = [
        "INSERT INTO users (id, name, is_admin) VALUES
            (1, 'alice', 1), (2, 'bob', 0), (3, 'carol', 1), (4, 'dave', 0)",
        "INSERT INTO profiles (id, user_id, bio) VALUES (1, 1, 'hi'), (2, 3, 'admin bio')",
        "INSERT INTO posts (id, author_id, title) VALUES
            (1, 1, 'first'), (2, 2, 'second'), (3, 3, 'third'), (4, 2, 'quiet')",
        // post 1: 3 comments, post 2: 2, post 3: 2, post 4: none
        // alice only comments on post 2 although she wrote post 1
        "INSERT INTO comments (id, post_id, author_id, is_reported, body) VALUES
            (1, 1, 2, 1, 'spam'),
            (2, 1, 3, 0, 'nice'),
            (3, 2, 1, 0, 'thanks'),
            (4, 2, 2, 0, 'ok'),
            (5, 3, 2, 1, 'spam again'),
            (6, 3, 3, 1, 'flagged by mistake'),
            (7, 1, 4, 0, 'late')",
        "INSERT INTO tags (id, name) VALUES (1, 'rust'), (2, 'sql')",
        "INSERT INTO posts_tags (post_id, tag_id) VALUES (1, 1), (1, 2), (2, 2)",
        // picture 2 points at user 1, which shares its id with post 1
        "INSERT INTO pictures (id, imageable_id, imageable_type, caption) VALUES
            (1, 1, 'Post', 'header'),
            (2, 1, 'User', 'avatar'),
            (3, 2, 'User', 'avatar'),
            (4, 3, 'Post', 'cover')",
        // 1 -> (2 -> 4, 3); 5 -> 6
        "INSERT INTO categories (id, parent_id, name) VALUES
            (1, NULL, 'root'),
            (2, 1, 'branch'),
            (3, 1, 'twig'),
            (4, 2, 'leaf'),
            (5, NULL, 'other root'),
            (6, 5, 'other child')",
    ];
    for sql in statements {
        db.execute_unprepared(sql).await.unwrap();
    }
}

/// Sorted `id`s of the rows a query returns.
pub async fn ids<E>(db: &DatabaseConnection, query: Select<E>) -> Vec<i32>
where
    E: EntityTrait,
{
    let mut ids: Vec<i32> = query
        .into_json()
        .all(db)
        .await
        .unwrap()
        .iter()
        .map(|row| row["id"].as_i64().unwrap() as i32)
        .collect();
    ids.sort_unstable();
    ids
}
