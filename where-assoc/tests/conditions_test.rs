#[path = "helpers.rs"]
mod helpers;

use helpers::{ids, post, setup_test_db, user};
use sea_orm::sea_query::{Alias, Condition, Expr};
use serde_json::json;
use where_assoc::fragment::in_list_params;
use where_assoc::prelude::*;
use where_assoc::{fragment, ident};

// Every accepted condition shape selects the same user through has_one :profile

async fn users_with_profile(db: &sea_orm::DatabaseConnection, condition: AssocCondition) -> Vec<i32> {
    ids(db, user::Entity::where_assoc_exists("profile", condition).unwrap()).await
}

#[tokio::test]
async fn test_expr_condition() {
    let db = setup_test_db().await;
    let cond = Expr::col((Alias::new("profiles"), Alias::new("bio"))).eq("hi");
    assert_eq!(users_with_profile(&db, cond.into()).await, vec![1]);
}

#[tokio::test]
async fn test_condition_tree() {
    let db = setup_test_db().await;
    let cond = Condition::any()
        .add(Expr::col((Alias::new("profiles"), Alias::new("bio"))).eq("hi"))
        .add(Expr::col((Alias::new("profiles"), Alias::new("bio"))).eq("nope"));
    assert_eq!(users_with_profile(&db, cond.into()).await, vec![1]);
}

#[tokio::test]
async fn test_text_condition() {
    let db = setup_test_db().await;
    assert_eq!(users_with_profile(&db, "bio = 'hi'".into()).await, vec![1]);
    assert_eq!(users_with_profile(&db, "bio = 'nope'".into()).await, Vec::<i32>::new());
    // blank text filters nothing
    assert_eq!(users_with_profile(&db, "  ".into()).await, vec![1, 3]);
}

#[tokio::test]
async fn test_fragment_with_binds() {
    let db = setup_test_db().await;
    let cond = AssocCondition::fragment("bio = ?", ["hi"]);
    assert_eq!(users_with_profile(&db, cond).await, vec![1]);

    let cond = fragment!("{} = {}", ident!("bio"), "admin bio").unwrap();
    assert_eq!(users_with_profile(&db, cond).await, vec![3]);

    let cond = AssocCondition::fragment_named("bio = :bio OR bio = :bio", [("bio", "hi")]).unwrap();
    assert_eq!(users_with_profile(&db, cond).await, vec![1]);
}

#[tokio::test]
async fn test_fragment_in_list() {
    let db = setup_test_db().await;
    let (list, values) = in_list_params(&["hi", "admin bio"]);
    let cond = AssocCondition::fragment(format!("bio IN ({})", list), values);
    assert_eq!(users_with_profile(&db, cond).await, vec![1, 3]);
}

#[tokio::test]
async fn test_mapping_condition() {
    let db = setup_test_db().await;
    assert_eq!(users_with_profile(&db, AssocCondition::mapping([("bio", "hi")])).await, vec![1]);
    assert_eq!(users_with_profile(&db, json!({"profiles.bio": "hi"}).into()).await, vec![1]);
    assert_eq!(
        users_with_profile(&db, json!({"bio": ["hi", "admin bio"]}).into()).await,
        vec![1, 3]
    );
    assert_eq!(users_with_profile(&db, AssocCondition::mapping([("bio", ColumnValue::Null)])).await, Vec::<i32>::new());
    assert_eq!(users_with_profile(&db, json!({}).into()).await, vec![1, 3]);
}

#[tokio::test]
async fn test_json_fragment_and_null() {
    let db = setup_test_db().await;
    assert_eq!(users_with_profile(&db, json!(["bio = ?", "hi"]).into()).await, vec![1]);
    assert_eq!(users_with_profile(&db, json!(null).into()).await, vec![1, 3]);
}

#[tokio::test]
async fn test_named_scope_condition() {
    let db = setup_test_db().await;
    assert_eq!(users_with_profile(&db, AssocCondition::named("greeting")).await, vec![1]);

    let reported = post::Entity::where_assoc_exists("comments", AssocCondition::named("reported")).unwrap();
    assert_eq!(ids(&db, reported).await, vec![1, 3]);
}

#[tokio::test]
async fn test_block_condition() {
    let db = setup_test_db().await;
    let cond = AssocCondition::block(|s| {
        let bio = s.col("bio");
        s.filter(bio.eq("hi"))
    });
    assert_eq!(users_with_profile(&db, cond).await, vec![1]);

    let cond = AssocCondition::block(|s| s.apply_scope("greeting"));
    assert_eq!(users_with_profile(&db, cond).await, vec![1]);
}

#[tokio::test]
async fn test_optional_condition() {
    let db = setup_test_db().await;
    let none: Option<&str> = None;
    assert_eq!(users_with_profile(&db, none.into()).await, vec![1, 3]);
    assert_eq!(users_with_profile(&db, Some("bio = 'hi'").into()).await, vec![1]);
}
