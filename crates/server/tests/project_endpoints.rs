mod common;

use axum::http::{header, StatusCode};
use rstest::rstest;
use serde_json::json;

use common::{id_of, TestApp};

#[rstest]
#[tokio::test]
async fn test_create_project_round_trips() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (manager, token) = app.create_user(&admin, "m@x.com", "manager").await;

    let response = app
        .post(
            "/api/projects",
            &token,
            json!({
                "name": "Apollo",
                "description": "Moon landing",
                "status": "paused",
                "deadline": "2030-01-01T00:00:00Z",
            }),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    let id = id_of(&response.body);
    assert_eq!(
        response.headers[header::LOCATION],
        format!("/api/projects/{id}").as_str()
    );

    let fetched = app.get(&format!("/api/projects/{id}"), &token).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["name"], "Apollo");
    assert_eq!(fetched.body["description"], "Moon landing");
    assert_eq!(fetched.body["status"], "paused");
    assert_eq!(fetched.body["managerId"], id_of(&manager).as_str());
    assert_eq!(fetched.body["manager"]["email"], "m@x.com");
    assert_eq!(fetched.body["tasksCount"], 0);
    assert_eq!(fetched.body["membersCount"], 0);
    assert!(fetched.body["deadline"]
        .as_str()
        .unwrap()
        .starts_with("2030-01-01T00:00:00"));
}

#[rstest]
#[tokio::test]
async fn test_plain_users_cannot_create_projects() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (_, token) = app.create_user(&admin, "u@x.com", "user").await;

    let response = app
        .post("/api/projects", &token, json!({ "name": "Nope" }))
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[rstest]
#[tokio::test]
async fn test_blank_project_name_is_rejected() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let response = app
        .post("/api/projects", &admin, json!({ "name": "   " }))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "VALIDATION_ERROR");
}

#[rstest]
#[tokio::test]
async fn test_manager_cannot_edit_another_managers_project() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (u1, u1_token) = app.create_user(&admin, "u1@x.com", "manager").await;
    let (_, u2_token) = app.create_user(&admin, "u2@x.com", "manager").await;
    let project = app.create_project(&u1_token, "P1").await;
    let id = id_of(&project);

    let update = json!({
        "id": id,
        "name": "Hijacked",
        "managerId": id_of(&u1),
        "status": "active",
    });

    let denied = app
        .put(&format!("/api/projects/{id}"), &u2_token, update.clone())
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let deleted = app.delete(&format!("/api/projects/{id}"), &u2_token).await;
    assert_eq!(deleted.status, StatusCode::FORBIDDEN);

    let own = app
        .put(&format!("/api/projects/{id}"), &u1_token, update.clone())
        .await;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.body["name"], "Hijacked");

    let by_admin = app
        .put(&format!("/api/projects/{id}"), &admin, update)
        .await;
    assert_eq!(by_admin.status, StatusCode::OK);
}

#[rstest]
#[tokio::test]
async fn test_update_missing_project_is_not_found() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let admin_id = id_of(&app.get("/api/auth/me", &admin).await.body);

    let response = app
        .put(
            "/api/projects/missing",
            &admin,
            json!({ "name": "X", "managerId": admin_id, "status": "active" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn test_list_projects_filters_and_mine() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (manager, manager_token) = app.create_user(&admin, "m@x.com", "manager").await;
    let (member, member_token) = app.create_user(&admin, "u@x.com", "user").await;

    let apollo = app.create_project(&manager_token, "Apollo Program").await;
    app.create_project(&manager_token, "Gemini").await;
    app.create_project(&admin, "Skylab").await;

    app.post(
        &format!("/api/projects/{}/members", id_of(&apollo)),
        &manager_token,
        json!({ "userId": id_of(&member) }),
    )
    .await;

    let by_manager = app
        .get(
            &format!("/api/projects?managerId={}", id_of(&manager)),
            &admin,
        )
        .await;
    assert_eq!(by_manager.body["totalCount"], 2);

    let searched = app.get("/api/projects?search=apollo", &admin).await;
    assert_eq!(searched.body["totalCount"], 1);
    assert_eq!(searched.body["projects"][0]["managerName"], "Test Person");

    let by_member = app
        .get(&format!("/api/projects?memberId={}", id_of(&member)), &admin)
        .await;
    assert_eq!(by_member.body["totalCount"], 1);

    let mine = app.get("/api/projects/mine", &member_token).await;
    assert_eq!(mine.status, StatusCode::OK);
    assert_eq!(mine.body["totalCount"], 1);
    assert_eq!(mine.body["projects"][0]["name"], "Apollo Program");

    let managed = app.get("/api/projects/mine", &manager_token).await;
    assert_eq!(managed.body["totalCount"], 2);

    let paused = app.get("/api/projects?status=paused", &admin).await;
    assert_eq!(paused.body["totalCount"], 0);
}

#[rstest]
#[tokio::test]
async fn test_delete_project_cascades_to_tasks() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let project = app.create_project(&admin, "Doomed").await;
    let project_id = id_of(&project);
    let task = app.create_task(&admin, &project_id, "Gone soon").await;

    let response = app
        .delete(&format!("/api/projects/{project_id}"), &admin)
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let task = app
        .get(&format!("/api/tasks/{}", id_of(&task)), &admin)
        .await;
    assert_eq!(task.status, StatusCode::NOT_FOUND);

    let again = app
        .delete(&format!("/api/projects/{project_id}"), &admin)
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn test_membership_lifecycle() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (user, _) = app.create_user(&admin, "u@x.com", "user").await;
    let user_id = id_of(&user);
    let project = app.create_project(&admin, "Team").await;
    let base = format!("/api/projects/{}", id_of(&project));

    let available = app.get(&format!("{base}/available-users"), &admin).await;
    assert_eq!(available.body["totalCount"], 2);

    let added = app
        .post(&format!("{base}/members"), &admin, json!({ "userId": user_id }))
        .await;
    assert_eq!(added.status, StatusCode::CREATED);
    assert_eq!(added.body["roleInProject"], "Member");

    let duplicate = app
        .post(&format!("{base}/members"), &admin, json!({ "userId": user_id }))
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let available = app.get(&format!("{base}/available-users"), &admin).await;
    assert_eq!(available.body["totalCount"], 1);

    let updated = app
        .put(
            &format!("{base}/members/{user_id}"),
            &admin,
            json!({ "roleInProject": "Reviewer" }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["roleInProject"], "Reviewer");

    let members = app.get(&format!("{base}/members"), &admin).await;
    assert_eq!(members.body["totalCount"], 1);
    assert_eq!(members.body["members"][0]["email"], "u@x.com");

    let removed = app
        .delete(&format!("{base}/members/{user_id}"), &admin)
        .await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);

    let removed_again = app
        .delete(&format!("{base}/members/{user_id}"), &admin)
        .await;
    assert_eq!(removed_again.status, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn test_members_require_edit_rights() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (user, user_token) = app.create_user(&admin, "u@x.com", "user").await;
    let project = app.create_project(&admin, "Team").await;

    let response = app
        .post(
            &format!("/api/projects/{}/members", id_of(&project)),
            &user_token,
            json!({ "userId": id_of(&user) }),
        )
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[rstest]
#[tokio::test]
async fn test_project_statistics() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let project = app.create_project(&admin, "Stats").await;
    let project_id = id_of(&project);
    let done = app.create_task(&admin, &project_id, "Done").await;
    app.create_task(&admin, &project_id, "Open").await;
    app.patch(
        &format!("/api/tasks/{}/status", id_of(&done)),
        &admin,
        json!({ "status": "done" }),
    )
    .await;

    let stats = app
        .get(&format!("/api/statistics/project/{project_id}"), &admin)
        .await;

    assert_eq!(stats.status, StatusCode::OK);
    assert_eq!(stats.body["projectName"], "Stats");
    assert_eq!(stats.body["totalTasks"], 2);
    assert_eq!(stats.body["completedTasks"], 1);
    assert_eq!(stats.body["completionRate"], 50.0);
    assert_eq!(stats.body["totalPlannedHours"], 8.0);
    let by_status = stats.body["tasksByStatus"].as_array().unwrap();
    assert_eq!(by_status.len(), 4);
    assert_eq!(by_status[0], json!({ "status": "new", "count": 1 }));
    assert_eq!(by_status[3], json!({ "status": "done", "count": 1 }));

    let dashboard = app.get("/api/statistics/dashboard", &admin).await;
    assert_eq!(dashboard.body["managedProjects"], 1);
    assert_eq!(dashboard.body["authoredTasks"], 2);
}

#[rstest]
#[tokio::test]
async fn test_user_statistics() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let (dev, _) = app.create_user(&admin, "dev@x.com", "user").await;
    let dev_id = id_of(&dev);
    let project = app.create_project(&admin, "Velocity").await;

    for (i, title) in ["One", "Two", "Three"].into_iter().enumerate() {
        let task = app.create_task(&admin, &id_of(&project), title).await;
        let uri = format!("/api/tasks/{}", id_of(&task));
        app.patch(&format!("{uri}/assignee"), &admin, json!({ "assigneeId": dev_id }))
            .await;
        if i == 0 {
            app.patch(&format!("{uri}/status"), &admin, json!({ "status": "done" }))
                .await;
        }
    }

    let stats = app
        .get(&format!("/api/statistics/user/{dev_id}"), &admin)
        .await;

    assert_eq!(stats.status, StatusCode::OK);
    assert_eq!(stats.body["userId"], dev_id.as_str());
    assert_eq!(stats.body["userName"], "Test Person");
    assert_eq!(stats.body["assignedTasks"], 3);
    assert_eq!(stats.body["completedTasks"], 1);
    assert_eq!(stats.body["createdTasks"], 0);
    let rate = stats.body["completionRate"].as_f64().unwrap();
    assert!((rate - 100.0 / 3.0).abs() < 1e-9);

    let me = app.get("/api/auth/me", &admin).await;
    let author = app
        .get(&format!("/api/statistics/user/{}", id_of(&me.body)), &admin)
        .await;
    assert_eq!(author.body["createdTasks"], 3);
    assert_eq!(author.body["completionRate"], 0.0);

    let missing = app.get("/api/statistics/user/ghost", &admin).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}
