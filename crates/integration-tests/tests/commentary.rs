//! End-to-end tests for `POST /v1/commentary` and `GET /v1/snapshots`

mod harness;

use std::time::Duration;

use futures_util::future::join_all;
use harness::config::ConfigBuilder;
use harness::mock_generator::MockGenerator;
use harness::server::TestServer;
use serde_json::{Value, json};

const KEY: &str = "E1/S1/student";

fn analytics(score: u32) -> Value {
    json!({
        "score": score,
        "max_score": 100,
        "percentile": 64,
        "topics": [{"name": "algebra", "score": 0.45}, {"name": "geometry", "score": 0.9}]
    })
}

#[tokio::test]
async fn first_lookup_computes_then_hits() {
    let mock = MockGenerator::start().await.unwrap();
    let server = TestServer::start(ConfigBuilder::new().with_generator(&mock.base_url()).build())
        .await
        .unwrap();

    let resp = server.commentary(KEY, &analytics(72)).await;
    assert_eq!(resp.status(), 200);
    let first: Value = resp.json().await.unwrap();

    assert_eq!(first["status"], "ready");
    assert_eq!(first["source"], "generated");
    assert_eq!(first["fresh"], true);
    assert_eq!(first["outcome"], "computed");
    assert_eq!(first["payload"]["kind"], "generated");
    assert_eq!(first["payload"]["commentary"]["text"], "Strong result overall.");
    assert_eq!(first["payload"]["commentary"]["next_steps"][0], "Review algebra");
    assert_eq!(first["last_message"], "Strong result overall.");
    assert_eq!(first["key"]["audience"], "student");

    let second: Value = server.commentary(KEY, &analytics(72)).await.json().await.unwrap();
    assert_eq!(second["outcome"], "hit");
    assert_eq!(second["content_hash"], first["content_hash"]);
    assert_eq!(second["payload"], first["payload"]);

    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn key_order_in_analytics_does_not_recompute() {
    let mock = MockGenerator::start().await.unwrap();
    let server = TestServer::start(ConfigBuilder::new().with_generator(&mock.base_url()).build())
        .await
        .unwrap();

    let a: Value = serde_json::from_str(r#"{"score": 72, "max_score": 100, "topics": [{"name": "a", "score": 0.5}, {"name": "b", "score": 1}]}"#).unwrap();
    let b: Value = serde_json::from_str(r#"{"topics": [{"score": 1.0, "name": "b"}, {"name": "a", "score": 0.5}], "max_score": 100, "score": 72}"#).unwrap();

    server.commentary(KEY, &a).await;
    let second: Value = server.commentary(KEY, &b).await.json().await.unwrap();

    assert_eq!(second["outcome"], "hit");
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn concurrent_lookups_share_one_generation() {
    let mock = MockGenerator::builder()
        .delay(Duration::from_millis(300))
        .start()
        .await
        .unwrap();
    let server = TestServer::start(ConfigBuilder::new().with_generator(&mock.base_url()).build())
        .await
        .unwrap();

    let input = analytics(72);
    let responses = join_all((0..8).map(|_| server.commentary(KEY, &input))).await;

    let mut computed = 0;
    for resp in responses {
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["fresh"], true);
        assert_eq!(body["payload"]["commentary"]["text"], "Strong result overall.");
        if body["outcome"] == "computed" {
            computed += 1;
        }
    }

    assert_eq!(computed, 1);
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn changed_analytics_recomputes() {
    let mock = MockGenerator::start().await.unwrap();
    let server = TestServer::start(ConfigBuilder::new().with_generator(&mock.base_url()).build())
        .await
        .unwrap();

    let first: Value = server.commentary(KEY, &analytics(72)).await.json().await.unwrap();
    let second: Value = server.commentary(KEY, &analytics(85)).await.json().await.unwrap();

    assert_eq!(second["outcome"], "computed");
    assert_ne!(second["content_hash"], first["content_hash"]);
    assert_eq!(mock.calls(), 2);

    let stored: Value = server.snapshot(KEY).await.json().await.unwrap();
    assert_eq!(stored["content_hash"], second["content_hash"]);
    assert_eq!(stored["fresh"], true);
}

#[tokio::test]
async fn audiences_are_cached_separately() {
    let mock = MockGenerator::start().await.unwrap();
    let server = TestServer::start(ConfigBuilder::new().with_generator(&mock.base_url()).build())
        .await
        .unwrap();

    server.commentary("E1/S1/student", &analytics(72)).await;
    let parent: Value = server.commentary("E1/S1/parent", &analytics(72)).await.json().await.unwrap();

    assert_eq!(parent["outcome"], "computed");
    assert_eq!(mock.calls(), 2);
}

#[tokio::test]
async fn failing_generator_resolves_to_fallback() {
    let mock = MockGenerator::builder().failing(10).start().await.unwrap();
    let server = TestServer::start(ConfigBuilder::new().with_generator(&mock.base_url()).build())
        .await
        .unwrap();

    let body: Value = server.commentary(KEY, &analytics(72)).await.json().await.unwrap();

    assert_eq!(body["status"], "ready");
    assert_eq!(body["source"], "fallback");
    assert_eq!(body["fresh"], true);
    assert_eq!(body["payload"]["kind"], "fallback");
    assert_eq!(
        body["payload"]["commentary"]["text"],
        "You scored 72 out of 100 (72%). That places you in the 64th percentile."
    );
    assert!(body["payload"]["reason"].as_str().unwrap().contains("500"));

    // A fallback row is a usable cache entry
    let again: Value = server.commentary(KEY, &analytics(72)).await.json().await.unwrap();
    assert_eq!(again["outcome"], "hit");
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn malformed_generator_output_resolves_to_fallback() {
    let mock = MockGenerator::builder()
        .content("Great job! Keep it up.")
        .start()
        .await
        .unwrap();
    let server = TestServer::start(ConfigBuilder::new().with_generator(&mock.base_url()).build())
        .await
        .unwrap();

    let body: Value = server.commentary("E1/S1/parent", &analytics(72)).await.json().await.unwrap();

    assert_eq!(body["source"], "fallback");
    assert!(
        body["payload"]["commentary"]["text"]
            .as_str()
            .unwrap()
            .starts_with("Your child scored 72")
    );
    assert!(body["payload"]["reason"].as_str().unwrap().contains("malformed"));
}

#[tokio::test]
async fn slow_generator_is_cut_off_by_timeout() {
    let mock = MockGenerator::builder()
        .delay(Duration::from_secs(2))
        .start()
        .await
        .unwrap();
    let config = ConfigBuilder::new()
        .with_generator(&mock.base_url())
        .with_timeouts("5s", "300ms")
        .build();
    let server = TestServer::start(config).await.unwrap();

    let body: Value = server.commentary(KEY, &analytics(72)).await.json().await.unwrap();

    assert_eq!(body["status"], "ready");
    assert_eq!(body["source"], "fallback");
    assert!(body["payload"]["reason"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn missing_generator_uses_fallback() {
    let server = TestServer::start(ConfigBuilder::new().build()).await.unwrap();

    let body: Value = server.commentary("E1/S1/teacher", &analytics(72)).await.json().await.unwrap();

    assert_eq!(body["source"], "fallback");
    assert!(
        body["payload"]["commentary"]["text"]
            .as_str()
            .unwrap()
            .starts_with("The student scored 72")
    );
    assert_eq!(
        body["payload"]["commentary"]["next_steps"][0],
        "Review algebra before the next assessment."
    );
}

#[tokio::test]
async fn waiter_times_out_with_pending_row() {
    let mock = MockGenerator::builder()
        .delay(Duration::from_millis(1500))
        .start()
        .await
        .unwrap();
    let config = ConfigBuilder::new()
        .with_generator(&mock.base_url())
        .with_timeouts("200ms", "5s")
        .build();
    let server = TestServer::start(config).await.unwrap();

    let input = analytics(72);
    let (owner, waiter) = tokio::join!(server.commentary(KEY, &input), async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        server.commentary(KEY, &input).await
    });

    let waiter: Value = waiter.json().await.unwrap();
    assert_eq!(waiter["outcome"], "timed_out");
    assert_eq!(waiter["status"], "computing");
    assert_eq!(waiter["fresh"], false);
    assert!(waiter.get("payload").is_none());

    let owner: Value = owner.json().await.unwrap();
    assert_eq!(owner["outcome"], "computed");
    assert_eq!(owner["status"], "ready");
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn waiter_gets_previous_result_while_new_input_computes() {
    let mock = MockGenerator::builder()
        .delay(Duration::from_millis(800))
        .start()
        .await
        .unwrap();
    let config = ConfigBuilder::new()
        .with_generator(&mock.base_url())
        .with_timeouts("200ms", "5s")
        .build();
    let server = TestServer::start(config).await.unwrap();

    let old: Value = server.commentary(KEY, &analytics(72)).await.json().await.unwrap();

    let input = analytics(85);
    let (_, waiter) = tokio::join!(server.commentary(KEY, &input), async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        server.commentary(KEY, &input).await
    });

    let waiter: Value = waiter.json().await.unwrap();
    assert_eq!(waiter["outcome"], "timed_out");
    assert_eq!(waiter["status"], "ready");
    assert_eq!(waiter["fresh"], false);
    assert_eq!(waiter["content_hash"], old["content_hash"]);
    assert_eq!(waiter["payload"], old["payload"]);
}

#[tokio::test]
async fn non_object_analytics_is_unprocessable() {
    let server = TestServer::start(ConfigBuilder::new().build()).await.unwrap();

    let resp = server.commentary(KEY, &json!([1, 2, 3])).await;
    assert_eq!(resp.status(), 422);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_input_error");
    assert_eq!(server.snapshot(KEY).await.status(), 404);
}

#[tokio::test]
async fn unknown_audience_is_bad_request() {
    let server = TestServer::start(ConfigBuilder::new().build()).await.unwrap();

    let resp = server.commentary("E1/S1/principal", &analytics(72)).await;
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn unknown_snapshot_is_not_found() {
    let server = TestServer::start(ConfigBuilder::new().build()).await.unwrap();

    let resp = server.snapshot("E9/S9/student").await;
    assert_eq!(resp.status(), 404);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "not_found_error");
}
