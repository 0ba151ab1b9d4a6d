//! Client identification sent with every request as tracing headers.

use std::sync::OnceLock;

/// Placeholder sent when a tracing field is deliberately withheld.
pub const NONE: &str = "[none]";

/// Identification of the calling application and user.
///
/// Rendered into the `x-ms-app`, `x-ms-user` and `x-ms-client-version`
/// headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDetails {
    application: String,
    user: String,
    client_version: String,
}

impl Default for ClientDetails {
    fn default() -> Self {
        Self {
            application: default_application(),
            user: default_user(),
            client_version: default_client_version(),
        }
    }
}

impl ClientDetails {
    /// Create details with explicit values.
    pub fn new(
        application: impl Into<String>,
        user: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Self {
        Self {
            application: application.into(),
            user: user.into(),
            client_version: client_version.into(),
        }
    }

    /// Build details for a connector embedding this client.
    ///
    /// The application header becomes
    /// `Kusto.<name>:{<version>}|App.{<app>}:{<app version>}|<k>:{<v>}`.
    /// When `send_user` is false the user header is withheld.
    pub fn from_connector(connector: &ConnectorDetails) -> Self {
        let mut fields = vec![(format!("Kusto.{}", connector.name), connector.version.clone())];

        if let Some(ref app_name) = connector.app_name {
            fields.push((
                format!("App.{}", escape_field(app_name)),
                connector
                    .app_version
                    .clone()
                    .unwrap_or_else(|| NONE.to_string()),
            ));
        }

        fields.extend(connector.additional_fields.iter().cloned());

        let user = if connector.send_user {
            connector.override_user.clone().unwrap_or_else(default_user)
        } else {
            NONE.to_string()
        };

        Self {
            application: format_header(&fields),
            user,
            client_version: default_client_version(),
        }
    }

    /// Override the application name.
    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }

    /// Override the user name.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Value of the `x-ms-app` header.
    pub fn application(&self) -> &str {
        &self.application
    }

    /// Value of the `x-ms-user` header.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Value of the `x-ms-client-version` header.
    pub fn client_version(&self) -> &str {
        &self.client_version
    }

    /// The three tracing headers as name/value pairs.
    pub fn headers(&self) -> [(&'static str, &str); 3] {
        [
            ("x-ms-app", self.application.as_str()),
            ("x-ms-user", self.user.as_str()),
            ("x-ms-client-version", self.client_version.as_str()),
        ]
    }
}

/// Description of a connector built on top of this client.
#[derive(Debug, Clone, Default)]
pub struct ConnectorDetails {
    /// Connector name, e.g. `Spark`.
    pub name: String,
    /// Connector version.
    pub version: String,
    /// Whether the local user name may be sent.
    pub send_user: bool,
    /// User name to send instead of the local one.
    pub override_user: Option<String>,
    /// Name of the application hosting the connector.
    pub app_name: Option<String>,
    /// Version of the hosting application.
    pub app_version: Option<String>,
    /// Extra `key:{value}` pairs appended to the application header.
    pub additional_fields: Vec<(String, String)>,
}

impl ConnectorDetails {
    /// Create connector details with a name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Allow the user name to be sent, optionally overriding it.
    pub fn with_user(mut self, override_user: Option<String>) -> Self {
        self.send_user = true;
        self.override_user = override_user;
        self
    }

    /// Set the hosting application.
    pub fn with_app(mut self, name: impl Into<String>, version: Option<String>) -> Self {
        self.app_name = Some(name.into());
        self.app_version = version;
        self
    }

    /// Append an additional header field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_fields.push((key.into(), value.into()));
        self
    }
}

/// Wrap a free-text field in braces, collapsing characters that would
/// break the header grammar.
pub fn escape_field(field: &str) -> String {
    static SEPARATORS: OnceLock<regex_lite::Regex> = OnceLock::new();
    let re = SEPARATORS.get_or_init(|| {
        regex_lite::Regex::new(r"[\r\n\s{}|:]+").expect("static pattern is valid")
    });
    format!("{{{}}}", re.replace_all(field, "_"))
}

/// Join `key:{value}` pairs with `|`, skipping blank keys or values.
fn format_header(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
        .map(|(k, v)| format!("{}:{}", k, escape_field(v)))
        .collect::<Vec<_>>()
        .join("|")
}

fn default_application() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| NONE.to_string())
}

fn default_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| NONE.to_string())
}

fn default_client_version() -> String {
    format!(
        "Kusto.Rust.Client:{}|Runtime.{}:{}",
        escape_field(env!("CARGO_PKG_VERSION")),
        escape_field("Rust"),
        escape_field(std::env::consts::OS),
    )
}
