use mockito::Matcher;
use platform::prelude::*;
use serde_json::json;

fn fabric(server: &mockito::ServerGuard) -> FabricClient {
    let config = FabricConfig::default()
        .with_base_url(format!("{}/v1", server.url()))
        .with_retry(RetryPolicy::none());
    FabricClient::new(config, "test-token").unwrap()
}

#[tokio::test]
async fn test_pending_definition_is_settled_through_result() {
    let mut server = mockito::Server::new_async().await;
    let location = format!("{}/v1/operations/op-42", server.url());
    let content = "eyJwcm9wZXJ0aWVzIjp7fX0=";

    let accepted = server
        .mock("POST", "/v1/workspaces/ws-1/items/p-1/getDefinition")
        .with_status(202)
        .with_header("location", &location)
        .with_header("x-ms-operation-id", "op-42")
        .create_async()
        .await;
    let state = server
        .mock("GET", "/v1/operations/op-42")
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_body(r#"{"status":"Succeeded","percentComplete":100}"#)
        .expect(1)
        .create_async()
        .await;
    let result = server
        .mock("GET", "/v1/operations/op-42/result")
        .with_status(200)
        .with_body(
            json!({
                "definition": {
                    "parts": [{
                        "path": "pipeline-content.json",
                        "payload": content,
                        "payloadType": "InlineBase64"
                    }]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = fabric(&server);
    let reply = client.get_item_definition("ws-1", "p-1").await.unwrap();
    assert!(reply.is_pending());

    let poller = LroPoller::new(PollPolicy::immediate(3));
    let response: ItemDefinitionResponse = poller.settle(&client, reply).await.unwrap();

    accepted.assert_async().await;
    state.assert_async().await;
    result.assert_async().await;
    let part = response.definition.part("pipeline-content.json").unwrap();
    assert_eq!(part.payload, content);
}

#[tokio::test]
async fn test_failed_job_instance_reports_failure_reason() {
    let mut server = mockito::Server::new_async().await;
    let location = format!(
        "{}/v1/workspaces/nb-ws/items/nb-1/jobs/instances/job-1",
        server.url()
    );

    let _run = server
        .mock("POST", "/v1/workspaces/nb-ws/items/nb-1/jobs/instances")
        .match_query(Matcher::UrlEncoded("jobType".into(), "RunNotebook".into()))
        .with_status(202)
        .with_header("location", &location)
        .with_header("retry-after", "0")
        .create_async()
        .await;
    let _state = server
        .mock("GET", "/v1/workspaces/nb-ws/items/nb-1/jobs/instances/job-1")
        .with_status(200)
        .with_body(
            r#"{"id":"job-1","status":"Failed","failureReason":{"errorCode":"NotebookFailed","message":"table missing"}}"#,
        )
        .create_async()
        .await;
    let result = server
        .mock("GET", Matcher::Regex(r"/result$".into()))
        .expect(0)
        .create_async()
        .await;

    let client = fabric(&server);
    let request = RunJobRequest::new()
        .with_parameter("source_workspace", "ws-src")
        .with_parameter("target_workspace", "ws-tgt")
        .with_parameter("copy_type", "warehouse");
    let handle = client.run_notebook("nb-ws", "nb-1", &request).await.unwrap();
    assert_eq!(handle.kind, OperationKind::JobInstance);

    let err = LroPoller::new(PollPolicy::immediate(3))
        .wait_for_result(&client, &handle)
        .await
        .unwrap_err();

    result.assert_async().await;
    match err {
        ApiError::OperationFailed { status, detail } => {
            assert_eq!(status, OperationStatus::Failed);
            assert!(detail.contains("table missing"));
        }
        other => panic!("expected OperationFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/workspaces/ws-1/git/connect")
        .with_status(400)
        .with_body(r#"{"errorCode":"InvalidInput"}"#)
        .expect(1)
        .create_async()
        .await;

    let config = FabricConfig::default()
        .with_base_url(format!("{}/v1", server.url()))
        .with_retry(RetryPolicy::with_retries(3, 1).without_jitter());
    let client = FabricClient::new(config, "test-token").unwrap();
    let request = GitConnectRequest::github("contoso", "fabric", "feature/x", "", "conn-1");

    let err = client.git_connect("ws-1", &request).await.unwrap_err();

    mock.assert_async().await;
    assert_eq!(err.status(), Some(400));
    assert!(!err.is_transient());
}
