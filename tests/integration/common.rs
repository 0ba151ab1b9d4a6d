use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Tenant used by connection strings in these tests.
pub const TENANT: &str = "contoso-tenant";

/// Serve cloud metadata that points logins back at the mock server.
pub async fn mount_metadata(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/rest/auth/metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "AzureAD": {
                "LoginEndpoint": server.uri(),
                "LoginMfaRequired": false,
                "KustoClientAppId": "first-party-app",
                "KustoClientRedirectUri": "https://microsoft/kustoclient",
                "KustoServiceResourceId": "https://kusto.kusto.windows.net",
                "FirstPartyAuthorityUrl": format!("{}/first-party", server.uri())
            }
        })))
        .mount(server)
        .await;
}

/// The token endpoint path for [`TENANT`].
pub fn token_path() -> String {
    format!("/{}/oauth2/v2.0/token", TENANT)
}

/// A v2 response with one primary result table.
pub fn v2_states() -> Value {
    json!([
        {"FrameType": "DataSetHeader", "IsProgressive": false, "Version": "v2.0"},
        {
            "FrameType": "DataTable",
            "TableId": 0,
            "TableKind": "QueryProperties",
            "TableName": "@ExtendedProperties",
            "Columns": [
                {"ColumnName": "TableId", "ColumnType": "int"},
                {"ColumnName": "Key", "ColumnType": "string"},
                {"ColumnName": "Value", "ColumnType": "dynamic"}
            ],
            "Rows": [[1, "Visualization", "{\"Visualization\":null}"]]
        },
        {
            "FrameType": "DataTable",
            "TableId": 1,
            "TableKind": "PrimaryResult",
            "TableName": "PrimaryResult",
            "Columns": [
                {"ColumnName": "State", "ColumnType": "string"},
                {"ColumnName": "Count", "ColumnType": "long"},
                {"ColumnName": "LastEvent", "ColumnType": "datetime"},
                {"ColumnName": "Duration", "ColumnType": "timespan"}
            ],
            "Rows": [
                ["TEXAS", 4701, "2024-09-29T08:28:54.5440000Z", "23:59:35.9853375"],
                ["KANSAS", 3166, null, null]
            ]
        },
        {"FrameType": "DataSetCompletion", "HasErrors": false, "Cancelled": false}
    ])
}

/// Connection string for an application key against the mock cluster.
pub fn app_key_connection(server: &MockServer) -> String {
    format!(
        "Data Source={};Initial Catalog=Samples;AAD Federated Security=True;\
         Application Client Id=app-id;Application Key=app-secret;Authority Id={}",
        server.uri(),
        TENANT
    )
}
