mod common;

use axum::http::StatusCode;
use rstest::rstest;
use serde_json::json;

use common::{id_of, TestApp};

#[rstest]
#[tokio::test]
async fn test_comment_crud_and_ownership() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, alice) = app.create_user(&admin, "alice@x.com", "user").await;
    let (_, bob) = app.create_user(&admin, "bob@x.com", "manager").await;
    let project = app.create_project(&admin, "Chat").await;
    let task = app.create_task(&admin, &id_of(&project), "Topic").await;

    let created = app
        .post(
            "/api/comments",
            &alice,
            json!({ "content": "Hello", "taskId": id_of(&task) }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let uri = format!("/api/comments/{}", id_of(&created.body));

    let fetched = app.get(&uri, &bob).await;
    assert_eq!(fetched.body["content"], "Hello");
    assert_eq!(fetched.body["taskTitle"], "Topic");

    let by_bob = app.put(&uri, &bob, json!({ "content": "Edited" })).await;
    assert_eq!(by_bob.status, StatusCode::FORBIDDEN);

    let by_alice = app.put(&uri, &alice, json!({ "content": "Edited" })).await;
    assert_eq!(by_alice.status, StatusCode::OK);
    assert_eq!(by_alice.body["content"], "Edited");

    let delete_by_bob = app.delete(&uri, &bob).await;
    assert_eq!(delete_by_bob.status, StatusCode::FORBIDDEN);

    let delete_by_admin = app.delete(&uri, &admin).await;
    assert_eq!(delete_by_admin.status, StatusCode::NO_CONTENT);

    let gone = app.get(&uri, &alice).await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn test_comment_validation() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let too_long = app
        .post("/api/comments", &admin, json!({ "content": "x".repeat(2001) }))
        .await;
    assert_eq!(too_long.status, StatusCode::BAD_REQUEST);

    let unknown_task = app
        .post(
            "/api/comments",
            &admin,
            json!({ "content": "Hi", "taskId": "missing" }),
        )
        .await;
    assert_eq!(unknown_task.status, StatusCode::BAD_REQUEST);

    let standalone = app
        .post("/api/comments", &admin, json!({ "content": "General note" }))
        .await;
    assert_eq!(standalone.status, StatusCode::CREATED);
    assert!(standalone.body["taskId"].is_null());
}

#[rstest]
#[tokio::test]
async fn test_comment_lists_filter_by_task_author_and_project() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (alice, alice_token) = app.create_user(&admin, "alice@x.com", "user").await;
    let p1 = app.create_project(&admin, "P1").await;
    let p2 = app.create_project(&admin, "P2").await;
    let t1 = app.create_task(&admin, &id_of(&p1), "T1").await;
    let t2 = app.create_task(&admin, &id_of(&p2), "T2").await;

    for (token, task, content) in [
        (&alice_token, &t1, "alpha note"),
        (&admin, &t1, "beta note"),
        (&alice_token, &t2, "gamma"),
    ] {
        let response = app
            .post(
                "/api/comments",
                token,
                json!({ "content": content, "taskId": id_of(task) }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    let by_task = app
        .get(&format!("/api/comments?taskId={}", id_of(&t1)), &admin)
        .await;
    assert_eq!(by_task.body["totalCount"], 2);

    let by_author = app
        .get(&format!("/api/comments?authorId={}", id_of(&alice)), &admin)
        .await;
    assert_eq!(by_author.body["totalCount"], 2);

    let searched = app.get("/api/comments?search=NOTE", &admin).await;
    assert_eq!(searched.body["totalCount"], 2);

    let for_project = app
        .get(&format!("/api/projects/{}/comments", id_of(&p2)), &admin)
        .await;
    assert_eq!(for_project.status, StatusCode::OK);
    assert_eq!(for_project.body["totalCount"], 1);
    assert_eq!(for_project.body["comments"][0]["content"], "gamma");
}
