//! Run one query or management command and print the primary results.
//!
//! ```sh
//! export KUSTO_CONNECTION_STRING='Data Source=https://help.kusto.windows.net;Managed Identity=system'
//! cargo run --bin kusto-query -- Samples 'StormEvents | take 5'
//! ```

use kusto_sdk::{ConnectionString, KustoQueryClient, ResultTable};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (database, text) = match (args.next(), args.next()) {
        (Some(database), Some(text)) => (database, text),
        _ => {
            eprintln!("Usage: kusto-query <database> <query or .command>");
            std::process::exit(2);
        }
    };

    let connection: ConnectionString = std::env::var("KUSTO_CONNECTION_STRING")
        .unwrap_or_else(|_| {
            eprintln!("Error: KUSTO_CONNECTION_STRING environment variable is not set.");
            std::process::exit(1);
        })
        .parse()
        .unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            std::process::exit(1);
        });

    let client = KustoQueryClient::from_connection_string(&connection).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let started = chrono::Utc::now();
    let dataset = client.execute(&database, &text).await.unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        if let Some(exceptions) = e.exceptions() {
            for exception in exceptions {
                eprintln!("  {exception}");
            }
        }
        std::process::exit(1);
    });
    let elapsed = chrono::Utc::now() - started;

    for table in dataset.primary_results() {
        print_table(table);
    }
    eprintln!("({} ms)", elapsed.num_milliseconds());
}

fn print_table(table: &ResultTable) {
    println!("# {}", table.name());

    let header: Vec<String> = table
        .columns()
        .iter()
        .map(|c| format!("{}:{}", c.name, c.column_type))
        .collect();
    println!("{}", header.join("\t"));

    for row in table.rows() {
        let cells: Vec<String> = row
            .values()
            .iter()
            .map(|value| match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
}
