//! Queries and commands end to end: connection string, token, request, decode.

use super::common::{app_key_connection, mount_metadata, token_path, v2_states};
use kusto_sdk::query::ErrorKind;
use kusto_sdk::{ClientRequestProperties, ConnectionString, KustoQueryClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(token_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "expires_in": 3599,
            "access_token": "app-token"
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn client(server: &MockServer) -> KustoQueryClient {
    mount_metadata(server).await;
    mount_token(server).await;

    let connection: ConnectionString = app_key_connection(server).parse().unwrap();
    KustoQueryClient::from_connection_string(&connection).unwrap()
}

#[tokio::test]
async fn test_query_decodes_primary_result() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/rest/query"))
        .and(header("Authorization", "Bearer app-token"))
        .and(header("x-ms-version", "2024-12-12"))
        .and(header("Accept", "application/json"))
        .and(body_partial_json(json!({"db": "Samples"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(v2_states()))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server).await;

    for _ in 0..2 {
        let dataset = client
            .execute_query("Samples", "StormEvents | summarize count() by State")
            .await
            .unwrap();

        assert_eq!(dataset.tables().len(), 2);
        let mut table = dataset.into_primary_result().unwrap();
        assert_eq!(table.find_column("Count"), Some(1));
        assert_eq!(table.find_column("count"), None);

        assert!(table.first());
        assert_eq!(table.get_string("State").unwrap(), "TEXAS");
        assert_eq!(table.get_i64("Count").unwrap(), 4701);
        assert!(table.get_i32("Count").unwrap_err().is_invalid_cast());
        assert_eq!(
            kusto_sdk::data::format_datetime(&table.get_datetime("LastEvent").unwrap()),
            "2024-09-29T08:28:54.5440000Z"
        );
        assert_eq!(
            kusto_sdk::data::format_timespan_literal(table.get_timespan("Duration").unwrap()),
            "time(23:59:35.9853375)"
        );

        assert!(table.next());
        assert_eq!(table.get_datetime_opt("LastEvent").unwrap(), None);
        assert!(table.get_datetime("LastEvent").unwrap_err().is_null_value());
        assert!(!table.next());
        assert!(!table.next());
    }
}

#[tokio::test]
async fn test_mgmt_command_with_properties() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/rest/mgmt"))
        .and(header("x-ms-client-request-id", "KRS.execute;fixed"))
        .and(body_partial_json(json!({
            "csl": ".show databases",
            "properties": {"Options": {"servertimeout": "00:02:00.0000000"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Tables": [
                {
                    "TableName": "Table_0",
                    "Columns": [
                        {"ColumnName": "DatabaseName", "DataType": "String", "ColumnType": "string"},
                        {"ColumnName": "Version", "DataType": "String", "ColumnType": "string"}
                    ],
                    "Rows": [["Samples", "v1.1"], ["Logs", "v7.0"]]
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let properties = ClientRequestProperties::new()
        .with_server_timeout(std::time::Duration::from_secs(120))
        .with_client_request_id("KRS.execute;fixed");

    let dataset = client(&server)
        .await
        .execute_mgmt_with_properties("", ".show databases", &properties)
        .await
        .unwrap();

    let names: Vec<String> = dataset
        .primary_result()
        .unwrap()
        .rows()
        .map(|row| row.get_string("DatabaseName").unwrap())
        .collect();
    assert_eq!(names, vec!["Samples", "Logs"]);
}

#[tokio::test]
async fn test_redirect_is_followed_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/rest/query"))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("Location", format!("{}/moved/v2/rest/query", server.uri())),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/moved/v2/rest/query"))
        .and(body_partial_json(json!({"csl": "StormEvents | count"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(v2_states()))
        .expect(1)
        .mount(&server)
        .await;

    let dataset = client(&server)
        .await
        .execute_query("Samples", "StormEvents | count")
        .await
        .unwrap();
    assert_eq!(dataset.primary_results().count(), 1);
}

#[tokio::test]
async fn test_blank_unauthorized_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/rest/query"))
        .respond_with(ResponseTemplate::new(401).insert_header("x-ms-activity-id", "act-401"))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .execute_query("Samples", "StormEvents")
        .await
        .unwrap_err();

    assert!(matches!(err.kind, ErrorKind::Client(_)));
    assert_eq!(
        err.client_error().unwrap().to_string(),
        "Http StatusCode='401', ActivityId='act-401'"
    );
    assert!(err.is_permanent());
}

#[tokio::test]
async fn test_partial_failure_in_completion_frame() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/rest/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"FrameType": "DataSetHeader", "IsProgressive": false, "Version": "v2.0"},
            {
                "FrameType": "DataTable",
                "TableId": 0,
                "TableKind": "PrimaryResult",
                "TableName": "PrimaryResult",
                "Columns": [{"ColumnName": "x", "ColumnType": "long"}],
                "Rows": [
                    [1],
                    {"Exceptions": ["Partial query failure: Low memory condition", "E_LOW_MEMORY"]}
                ]
            },
            {"FrameType": "DataSetCompletion", "HasErrors": true, "Cancelled": false}
        ])))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .execute_query("Samples", "T")
        .await
        .unwrap_err();

    assert_eq!(err.exceptions().map(<[String]>::len), Some(2));
}
