mod test_harness;

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use hirequeue::api::{router, ApiState};
use hirequeue::engine::JobEngine;
use hirequeue::scheduler::JobKind;
use hirequeue::worker::HandlerRegistry;
use test_harness::*;

fn app(engine: &JobEngine) -> Router {
    router(ApiState {
        engine: engine.clone(),
    })
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn submit_body(kind: &str, payload: Value) -> Value {
    json!({ "kind": kind, "payload": payload, "owner_id": "user-1" })
}

#[tokio::test]
async fn test_health_endpoint() {
    let engine = start_default(test_config());

    let (status, body) = send(app(&engine), get("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workers"], 2);
    assert_eq!(body["draining"], false);
    assert_eq!(body["registered_kinds"].as_array().unwrap().len(), 5);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_submit_then_poll_status() {
    let engine = start_default(test_config());

    let (status, body) = send(
        app(&engine),
        post("/api/jobs", submit_body("render_pdf", render_payload("resume-7"))),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    wait_terminal(&engine, job_id.parse().unwrap()).await;

    let (status, body) = send(app(&engine), get(&format!("/api/jobs/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["kind"], "render_pdf");
    assert_eq!(body["progress"], 100);
    assert_eq!(
        body["result"]["data"]["uri"],
        format!("{}/resume-7.pdf", DOCUMENT_BASE)
    );
    engine.shutdown().await;
}

#[tokio::test]
async fn test_submit_rejections() {
    let engine = start_default(test_config());

    let (status, body) = send(
        app(&engine),
        post("/api/jobs", submit_body("send_email", json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown_kind");

    let (status, body) = send(
        app(&engine),
        post("/api/jobs", submit_body("render_pdf", json!({ "resume": 1 }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_payload");

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/jobs")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app(&engine), malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert!(!body["message"].as_str().unwrap().is_empty());

    let (_, body) = send(app(&engine), get("/api/jobs")).await;
    assert!(body["jobs"].as_array().unwrap().is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn test_job_lookup_errors() {
    let engine = start_default(test_config());

    let (status, body) = send(app(&engine), get("/api/jobs/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let missing = uuid::Uuid::new_v4();
    let (status, body) = send(app(&engine), get(&format!("/api/jobs/{}", missing))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = send(
        app(&engine),
        post(&format!("/api/jobs/{}/cancel", missing), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_cancel_endpoint() {
    let registry = HandlerRegistry::builder()
        .register(JobKind::RenderPdf, cooperative_renderer())
        .build();
    let engine = start_with(test_config().with_workers(1), registry);

    let running = engine
        .submit(JobKind::RenderPdf, render_payload("resume-1"), "user-1")
        .await
        .unwrap();
    wait_running(&engine, running).await;
    let queued = engine
        .submit(JobKind::RenderPdf, render_payload("resume-2"), "user-1")
        .await
        .unwrap();

    let (status, body) = send(
        app(&engine),
        post(&format!("/api/jobs/{}/cancel", queued), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "removed");

    let (status, body) = send(
        app(&engine),
        post(&format!("/api/jobs/{}/cancel", running), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "signalled");

    let snapshot = wait_terminal(&engine, running).await;
    assert_eq!(snapshot.status.to_string(), "failed");

    let (status, body) = send(
        app(&engine),
        post(&format!("/api/jobs/{}/cancel", running), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_finished");
    engine.shutdown().await;
}

#[tokio::test]
async fn test_list_pagination_and_filters() {
    let registry = HandlerRegistry::builder()
        .register(JobKind::RenderPdf, hanging_renderer())
        .build();
    // No free worker picks anything up while the first job hangs.
    let engine = start_with(
        test_config()
            .with_workers(1)
            .with_drain_timeout(Duration::from_millis(200)),
        registry,
    );
    for i in 0..5 {
        let owner = if i % 2 == 0 { "alice" } else { "bob" };
        engine
            .submit(JobKind::RenderPdf, render_payload(&format!("r-{}", i)), owner)
            .await
            .unwrap();
    }

    let (status, first) = send(app(&engine), get("/api/jobs?page_size=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["jobs"].as_array().unwrap().len(), 2);
    assert_eq!(first["next_page_token"], "2");

    let (_, last) = send(app(&engine), get("/api/jobs?page_size=2&page_token=4")).await;
    assert_eq!(last["jobs"].as_array().unwrap().len(), 1);
    assert!(last.get("next_page_token").is_none());

    let (_, alice) = send(app(&engine), get("/api/jobs?owner_id=alice")).await;
    assert_eq!(alice["jobs"].as_array().unwrap().len(), 3);

    let (_, scored) = send(app(&engine), get("/api/jobs?kind=score_ats")).await;
    assert!(scored["jobs"].as_array().unwrap().is_empty());

    let (status, body) = send(app(&engine), get("/api/jobs?status=sleeping")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = send(app(&engine), get("/api/jobs?page_token=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(app(&engine), get("/api/jobs?page_size=abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert!(!body["message"].as_str().unwrap().is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_panel_endpoints() {
    let engine = start_default(test_config());

    let (status, body) = send(app(&engine), get("/api/panels/iv-404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "aggregation_key_not_found");

    for (role, weight, score) in [("hiring-manager", 1.0, 80.0), ("technical-lead", 2.0, 90.0)] {
        let (status, body) = send(
            app(&engine),
            post(
                "/api/panels/iv-1/contributions",
                json!({ "judge_role": role, "weight": weight, "score": score }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["contribution_id"].is_string());
    }

    let (status, panel) = send(app(&engine), get("/api/panels/iv-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!((panel["aggregated_score"].as_f64().unwrap() - 86.666_666_7).abs() < 1e-6);
    assert_eq!(panel["complete"], false);

    let (status, panel) = send(app(&engine), post("/api/panels/iv-1/finalize", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(panel["complete"], true);

    let (status, body) = send(
        app(&engine),
        post(
            "/api/panels/iv-1/contributions",
            json!({ "judge_role": "hr", "weight": -2.0, "score": 50.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_contribution");
    engine.shutdown().await;
}

#[tokio::test]
async fn test_panel_key_with_encoded_slash() {
    let engine = start_default(test_config());

    let (status, _) = send(
        app(&engine),
        post(
            "/api/panels/iv%2F1/contributions",
            json!({ "judge_role": "hiring-manager", "weight": 1.0, "score": 75.0 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, panel) = send(app(&engine), get("/api/panels/iv%2F1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(panel["aggregation_key"], "iv/1");
    assert_eq!(panel["aggregated_score"], 75.0);
    assert!(engine.get_aggregated("iv/1").await.is_ok());
    engine.shutdown().await;
}

#[tokio::test]
async fn test_zero_weight_panel_is_unprocessable() {
    let engine = start_default(test_config());
    engine
        .submit_contribution("iv-0", "observer", 0.0, 70.0)
        .await
        .unwrap();

    let (status, body) = send(app(&engine), get("/api/panels/iv-0")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "no_weighted_input");
    engine.shutdown().await;
}

#[tokio::test]
async fn test_capacity_and_draining_are_unavailable() {
    let registry = HandlerRegistry::builder()
        .register(JobKind::RenderPdf, cooperative_renderer())
        .build();
    let engine = start_with(
        test_config().with_workers(1).with_queue_capacity(1),
        registry,
    );
    let running = engine
        .submit(JobKind::RenderPdf, render_payload("r-1"), "user-1")
        .await
        .unwrap();
    wait_running(&engine, running).await;
    let queued = engine
        .submit(JobKind::RenderPdf, render_payload("r-2"), "user-1")
        .await
        .unwrap();

    let (status, body) = send(
        app(&engine),
        post("/api/jobs", submit_body("render_pdf", render_payload("r-3"))),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "capacity_exceeded");

    engine.cancel(queued).await.unwrap();
    engine.cancel(running).await.unwrap();
    let shutdown = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.shutdown().await })
    };
    while !engine.is_draining() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let (status, body) = send(
        app(&engine),
        post("/api/jobs", submit_body("render_pdf", render_payload("r-4"))),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "draining");

    shutdown.await.unwrap();
}
