//! Tests for the HTTP job-queue client against a mock server.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use agent_fleet::application::ports::JobQueueClient;
use agent_fleet::domain::error::QueueError;
use agent_fleet::infra::HttpJobQueueClient;
use fleet_common::{BuildInfo, Chunk, Job};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> HttpJobQueueClient {
    HttpJobQueueClient::new(
        format!("{}/v3/", server.uri()),
        BuildInfo::for_host("1.2.3", "42"),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn register_authenticates_with_registration_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/register"))
        .and(header("authorization", "Token reg-secret"))
        .and(body_partial_json(json!({
            "name": "agent-a",
            "tags": ["aws", "queue=dev"],
            "version": "1.2.3",
            "build": "42",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "0189",
            "name": "agent-a",
            "access_token": "agent-token",
            "endpoint": "https://agent.example.com/v3",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tags = vec!["aws".to_string(), "queue=dev".to_string()];
    let agent = client(&server)
        .register("agent-a", "reg-secret", &tags)
        .await
        .unwrap();

    assert_eq!(agent.id, "0189");
    assert_eq!(agent.access_token, "agent-token");
}

#[tokio::test]
async fn ping_returns_offered_job() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/ping"))
        .and(header("authorization", "Token agent-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "action": "idle",
            "job": {
                "id": "job-1",
                "state": "scheduled",
                "env": { "BUILDKITE_PIPELINE_SLUG": "deploy" },
                "command": "make test",
            },
        })))
        .mount(&server)
        .await;

    let ping = client(&server).ping("agent-token").await.unwrap();

    let job = ping.job.expect("job offered");
    assert_eq!(job.id, "job-1");
    assert_eq!(job.pipeline_slug(), Some("deploy"));
    assert_eq!(job.extra.get("command"), Some(&json!("make test")));
}

#[tokio::test]
async fn heartbeat_posts_sent_time() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/heartbeat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sent_at": "2024-01-01T00:00:00Z",
            "received_at": "2024-01-01T00:00:01Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let beat = client(&server).beat("agent-token").await.unwrap();

    assert_eq!(beat.received_at.as_deref(), Some("2024-01-01T00:00:01Z"));
}

#[tokio::test]
async fn non_success_status_is_a_queue_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/ping"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let err = client(&server).ping("stale").await.unwrap_err();

    match err.downcast_ref::<QueueError>() {
        Some(QueueError::Status {
            operation,
            status,
            body,
        }) => {
            assert_eq!(*operation, "ping");
            assert_eq!(*status, 401);
            assert_eq!(body, "bad token");
        }
        None => panic!("expected queue error, got {err:#}"),
    }
}

#[tokio::test]
async fn accept_and_finish_use_job_paths() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v3/jobs/job-1/accept"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "job-1",
            "state": "accepted",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v3/jobs/job-1/finish"))
        .and(body_partial_json(json!({ "exit_status": "-99" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let job = Job {
        id: "job-1".into(),
        ..Job::default()
    };

    let accepted = client.accept_job("agent-token", &job).await.unwrap();
    assert_eq!(accepted.state.as_deref(), Some("accepted"));

    let finished = Job {
        exit_status: Some("-99".into()),
        finished_at: Some("2024-01-01T00:00:00.000000000Z".into()),
        ..accepted
    };
    client.finish_job("agent-token", &finished).await.unwrap();
}

#[tokio::test]
async fn chunk_upload_sends_position_in_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/jobs/job-1/chunks"))
        .and(query_param("sequence", "3"))
        .and(query_param("offset", "100"))
        .and(query_param("size", "5"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let chunk = Chunk {
        data: "hello".into(),
        sequence: 3,
        offset: 100,
        size: 5,
    };
    client(&server)
        .upload_chunk("agent-token", "job-1", &chunk)
        .await
        .unwrap();
}
