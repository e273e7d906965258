#![cfg(feature = "server")]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use loft_ledger::api::{router, AppState, USER_HEADER};
use loft_ledger::entities::user;
use loft_ledger::setup_database;
use rusqlite::Connection;
use serde_json::{json, Value};
use tower::ServiceExt; // for oneshot

struct TestApp {
    router: Router,
    breeder: i64,
    other: i64,
}

fn test_app() -> TestApp {
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    let breeder = user::create_user(&conn, "Breeder", "breeder@example.com").unwrap().id;
    let other = user::create_user(&conn, "Neighbour", "neighbour@example.com").unwrap().id;
    TestApp {
        router: router(AppState::new(conn)),
        breeder,
        other,
    }
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, user: Option<i64>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = user {
            builder = builder.header(USER_HEADER, id.to_string());
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(self.breeder), None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(self.breeder), Some(body)).await
    }

    /// Create a pigeon for the breeder and return its id
    async fn pigeon(&self, body: Value) -> i64 {
        let (status, json) = self.post("/api/pigeons", body).await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["data"]["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn health_needs_no_user() {
    let app = test_app();
    let (status, json) = app.send(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["status"], "ok");
}

#[tokio::test]
async fn missing_or_unknown_user_is_unauthorized() {
    let app = test_app();
    let (status, json) = app.send(Method::GET, "/api/pigeons", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);

    let (status, _) = app.send(Method::GET, "/api/pigeons", Some(9999), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pigeon_validation_errors_are_keyed_by_field() {
    let app = test_app();
    let (status, json) = app
        .post("/api/pigeons", json!({"gender": "rooster", "hatch_date": "yesterday"}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["success"], false);
    assert!(json["errors"]["ring_number"].is_string());
    assert!(json["errors"]["gender"].is_string());
    assert!(json["errors"]["hatch_date"].is_string());
}

#[tokio::test]
async fn pigeon_crud_and_ring_check() {
    let app = test_app();
    let id = app
        .pigeon(json!({"ring_number": "BE-2024-1234567", "name": "Blue Boy", "gender": "male"}))
        .await;

    let (status, json) = app.get(&format!("/api/pigeons/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["name"], "Blue Boy");
    assert_eq!(json["data"]["status"], "stock");

    let (_, json) = app.get("/api/pigeons/check-ring?ring_number=be%202024%201234567").await;
    assert_eq!(json["data"]["exact_match"]["id"], id);
    assert_eq!(json["data"]["similar_matches"], json!([]));

    let (_, json) = app
        .get(&format!("/api/pigeons/check-ring?ring_number=BE-2024-1234567&exclude_id={id}"))
        .await;
    assert!(json["data"]["exact_match"].is_null());

    let (status, json) = app
        .send(
            Method::PATCH,
            &format!("/api/pigeons/{id}"),
            Some(app.breeder),
            Some(json!({"ring_number": "BE-2024-1234567", "status": "racing"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["status"], "racing");

    let (_, json) = app.get("/api/pigeons?status=racing,breeding").await;
    assert_eq!(json["data"]["total"], 1);

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/pigeons/{id}"), Some(app.breeder), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&format!("/api/pigeons/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn foreign_pigeon_is_not_found_and_foreign_tag_is_forbidden() {
    let app = test_app();
    let pigeon = app.pigeon(json!({"ring_number": "BE-2024-1"})).await;
    let (status, json) = app
        .post("/api/color-tags", json!({"name": "Widow", "color": "#ff5733"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["color"], "#FF5733");
    let tag = json["data"]["id"].as_i64().unwrap();

    let (status, _) = app
        .send(Method::GET, &format!("/api/pigeons/{pigeon}"), Some(app.other), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/color-tags/{tag}"), Some(app.other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn pedigree_endpoint_walks_parents() {
    let app = test_app();
    let sire = app.pigeon(json!({"ring_number": "BE-2018-1", "gender": "male"})).await;
    let dam = app.pigeon(json!({"ring_number": "BE-2018-2", "gender": "female"})).await;
    let child = app
        .pigeon(json!({
            "ring_number": "BE-2022-3",
            "sire_id": sire,
            "dam_id": dam,
        }))
        .await;

    let (status, json) = app.get(&format!("/api/pigeons/{child}/pedigree")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["label"], "BE-2022-3");
    assert_eq!(json["data"]["sire"]["id"], sire);
    assert_eq!(json["data"]["dam"]["label"], "BE-2018-2");
}

#[tokio::test]
async fn bloodline_in_use_cannot_be_deleted() {
    let app = test_app();
    app.pigeon(json!({
        "ring_number": "BE-2024-1",
        "bloodlines": [{"name": "janssen", "is_primary": true}],
    }))
    .await;

    let (_, json) = app.get("/api/bloodlines").await;
    assert_eq!(json["data"][0]["name"], "JANSSEN");
    let id = json["data"][0]["id"].as_i64().unwrap();

    let (status, json) = app
        .send(Method::DELETE, &format!("/api/bloodlines/{id}"), Some(app.breeder), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        json["error"],
        "Cannot delete bloodline. It is assigned to 1 pigeon(s)."
    );
}

#[tokio::test]
async fn color_tag_delete_reports_cleared_pigeons() {
    let app = test_app();
    let (_, json) = app
        .post("/api/color-tags", json!({"name": "Sprint", "color": "#00AA00"}))
        .await;
    let tag = json["data"]["id"].as_i64().unwrap();
    app.pigeon(json!({"ring_number": "BE-2024-1", "color_tag_id": tag})).await;

    let (status, json) = app
        .send(Method::DELETE, &format!("/api/color-tags/{tag}"), Some(app.breeder), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["pigeons_affected"], 1);
}

#[tokio::test]
async fn pairing_session_moves_parents_between_stock_and_breeding() {
    let app = test_app();
    let sire = app.pigeon(json!({"ring_number": "BE-2020-1", "gender": "male"})).await;
    let dam = app.pigeon(json!({"ring_number": "BE-2020-2", "gender": "female"})).await;

    let (status, json) = app
        .post("/api/pairings", json!({"sire_id": sire, "dam_id": dam}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["data"]["pair_name"], "Pair #1");
    let pairing = json["data"]["id"].as_i64().unwrap();

    let (_, json) = app.get(&format!("/api/pigeons/{sire}")).await;
    assert_eq!(json["data"]["status"], "breeding");

    let (status, json) = app
        .post("/api/pairings", json!({"sire_id": sire, "dam_id": dam}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json["errors"]["sire_id"],
        "One or both pigeons are already in an active pairing."
    );

    let (status, json) = app
        .post(
            &format!("/api/pairings/{pairing}/clutches"),
            json!({"eggs_laid_date": "2025-03-01"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["data"]["clutch_number"], 1);

    let (status, _) = app
        .post(&format!("/api/pairings/{pairing}/end-session"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, json) = app.get(&format!("/api/pigeons/{dam}")).await;
    assert_eq!(json["data"]["status"], "stock");

    let (status, json) = app
        .post(&format!("/api/pairings/{pairing}/end-session"), json!({}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["errors"]["status"].is_string());
}

#[tokio::test]
async fn club_season_race_flow() {
    let app = test_app();
    let racer = app
        .pigeon(json!({"ring_number": "BE-2024-77", "status": "racing"}))
        .await;
    let outsider = app
        .pigeon(json!({"ring_number": "BE-2024-78", "status": "racing"}))
        .await;

    let (status, json) = app
        .post("/api/clubs", json!({"name": "De Vrije Vliegers", "status": "active"}))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    let club = json["data"]["id"].as_i64().unwrap();

    let (status, json) = app
        .post(
            &format!("/api/clubs/{club}/seasons"),
            json!({"name": "Season 2025", "year": 2025, "status": "active"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    let season = json["data"]["id"].as_i64().unwrap();
    let base = format!("/api/clubs/{club}/seasons/{season}");

    let (status, _) = app
        .post(&format!("{base}/entries"), json!({"pigeon_id": racer, "entry_number": "12"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = app
        .post(
            &format!("{base}/races"),
            json!({"name": "Quievrain", "distance": 120.5, "distance_unit": "km", "release_time": "07:30"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    let race = json["data"]["id"].as_i64().unwrap();

    let (status, json) = app
        .post(&format!("{base}/races/{race}/results"), json!({"pigeon_id": outsider}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{json}");

    let (_, json) = app
        .post(&format!("{base}/races/{race}/add-all-entries"), json!({}))
        .await;
    assert_eq!(json["data"]["added"], 1);

    let (status, json) = app
        .send(
            Method::PATCH,
            &format!("{base}/races/{race}/results/{racer}"),
            Some(app.breeder),
            Some(json!({"position": 1, "arrival_time": "09:12:40", "speed": 1320.4})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");

    let (_, json) = app.get(&format!("{base}/races/{race}")).await;
    assert_eq!(json["data"]["arrived_count"], 1);
    assert_eq!(json["data"]["total_entries"], 1);
    assert_eq!(json["data"]["display_name"], "Quievrain 120.50km 1/1");
    assert_eq!(json["data"]["results"][0]["position"], 1);

    let (_, json) = app.get(&base).await;
    let available: Vec<i64> = json["data"]["available_pigeons"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(available, vec![outsider]);
}

#[tokio::test]
async fn circuits_are_isolated_and_nested_ids_checked() {
    let app = test_app();
    let (_, json) = app
        .post("/api/clubs", json!({"name": "Noord", "status": "active"}))
        .await;
    let club = json["data"]["id"].as_i64().unwrap();
    let (_, json) = app
        .post("/api/clubs", json!({"name": "Zuid", "status": "active"}))
        .await;
    let other_club = json["data"]["id"].as_i64().unwrap();
    let (_, json) = app
        .post(
            &format!("/api/clubs/{club}/seasons"),
            json!({"name": "2025", "year": 2025, "status": "active"}),
        )
        .await;
    let season = json["data"]["id"].as_i64().unwrap();

    let (_, json) = app.get("/api/olr-races").await;
    assert_eq!(json["data"], json!([]));
    let (status, _) = app.get(&format!("/api/olr-races/{club}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .get(&format!("/api/clubs/{other_club}/seasons/{season}"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(Method::GET, &format!("/api/clubs/{club}"), Some(app.other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn marketplace_is_public_and_hides_prices() {
    let app = test_app();
    let open = app.pigeon(json!({"ring_number": "BE-2024-1"})).await;
    let secret = app.pigeon(json!({"ring_number": "BE-2024-2"})).await;

    let (status, _) = app
        .post("/api/sales", json!({"pigeon_id": open, "price": 150.0}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, json) = app
        .post("/api/sales", json!({"pigeon_id": secret, "price": 900.0, "hide_price": true}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let secret_sale = json["data"]["id"].as_i64().unwrap();

    let (status, _) = app
        .post("/api/sales", json!({"pigeon_id": open, "price": 10.0}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, json) = app.send(Method::GET, "/api/marketplace", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let listings = json["data"].as_array().unwrap();
    assert_eq!(listings.len(), 2);
    assert_eq!(listings[0]["pigeon"]["id"], secret);
    assert!(listings[0]["price"].is_null());
    assert_eq!(listings[1]["price"], 150.0);
    assert_eq!(listings[1]["owner"]["name"], "Breeder");

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/sales/{secret_sale}"), Some(app.other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = app.post(&format!("/api/sales/{secret_sale}/sold"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "sold");
}

#[tokio::test]
async fn dashboard_counts_pigeons() {
    let app = test_app();
    for ring in ["BE-1", "BE-2", "BE-3"] {
        app.pigeon(json!({"ring_number": ring})).await;
    }
    let (status, json) = app.get("/api/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total_pigeons"], 3);
    assert_eq!(json["data"]["recent_pigeons"].as_array().unwrap().len(), 3);
}
