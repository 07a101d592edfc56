//! Integration tests for the full tool pipeline on an in-memory SQLite
//! source: resolve, bind, execute, materialize.

use serde_json::json;
use sqltool_mcp_server::db::source::DbPool;
use sqltool_mcp_server::db::{QueryContext, Source, SourceRegistry};
use sqltool_mcp_server::models::ScalarValue;
use sqltool_mcp_server::tools::{
    ClaimMap, CollectingObserver, ParamValues, ToolRegistry, ToolsFile,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

const TOOLS_JSON: &str = r#"{
    "tools": {
        "list-dept": {
            "source": "hr",
            "description": "List employees in a department",
            "statement": "SELECT name, email, salary FROM employees WHERE dept = ?1 ORDER BY id",
            "parameters": [
                {"name": "dept", "type": "string", "description": "Department name"}
            ]
        },
        "pick-columns": {
            "source": "hr",
            "statement": "SELECT {{cols}} FROM employees WHERE salary > ?1 ORDER BY id",
            "parameters": [
                {"name": "min_salary", "type": "float"}
            ],
            "templateParameters": [
                {"name": "cols", "type": "array", "items": "string", "rendering": "identifierList"}
            ]
        },
        "email-blob": {
            "source": "hr",
            "statement": "SELECT CAST(email AS BLOB) AS email FROM employees WHERE id = ?1",
            "parameters": [
                {"name": "id", "type": "integer"}
            ]
        }
    }
}"#;

/// In-memory SQLite keeps one database per connection, so the pool is
/// capped at a single connection to share the seeded data.
async fn build_registry() -> (Arc<ToolRegistry>, Arc<CollectingObserver>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE employees (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            dept TEXT NOT NULL,
            salary REAL
        )",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO employees (id, name, email, dept, salary) VALUES
            (1, 'Alice Smith', 'alice@example.com', 'Engineering', 95000.0),
            (2, 'Bob Johnson', NULL, 'Sales', 61000.0),
            (3, 'Carol White', 'carol@example.com', 'Engineering', 102000.0),
            (4, 'Dan Brown', 'dan@example.com', 'Support', 52000.0)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let mut sources = SourceRegistry::default();
    sources.insert(Source::from_pool("hr", DbPool::SQLite(pool)));

    let file: ToolsFile = serde_json::from_str(TOOLS_JSON).unwrap();
    let observer = Arc::new(CollectingObserver::new());
    let registry = ToolRegistry::build(file, &sources, observer.clone()).unwrap();
    (Arc::new(registry), observer)
}

fn args(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().unwrap().clone()
}

#[tokio::test]
async fn test_rows_keep_query_order_and_identical_columns() {
    let (registry, _) = build_registry().await;
    let tool = registry.get("list-dept").unwrap();
    let values = tool
        .parse_params(&args(json!({"dept": "Engineering"})), &ClaimMap::new())
        .unwrap();

    let records = tool.invoke(&QueryContext::new(), &values).await.unwrap();

    assert_eq!(records.len(), 2);
    for record in &records {
        let columns: Vec<&str> = record.columns().collect();
        assert_eq!(columns, vec!["name", "email", "salary"]);
    }
    assert_eq!(
        records[0].get("name"),
        Some(&ScalarValue::Text("Alice Smith".to_string()))
    );
    assert_eq!(
        records[1].get("name"),
        Some(&ScalarValue::Text("Carol White".to_string()))
    );
}

#[tokio::test]
async fn test_null_database_value_stays_null() {
    let (registry, _) = build_registry().await;
    let tool = registry.get("list-dept").unwrap();
    let values = tool
        .parse_params(&args(json!({"dept": "Sales"})), &ClaimMap::new())
        .unwrap();

    let records = tool.invoke(&QueryContext::new(), &values).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("email"), Some(&ScalarValue::Null));
}

#[tokio::test]
async fn test_zero_rows_is_empty_sequence_not_error() {
    let (registry, _) = build_registry().await;
    let tool = registry.get("list-dept").unwrap();
    let values = tool
        .parse_params(&args(json!({"dept": "Accounting"})), &ClaimMap::new())
        .unwrap();

    let records = tool.invoke(&QueryContext::new(), &values).await.unwrap();
    assert!(records.is_empty());
    assert_eq!(serde_json::to_string(&records).unwrap(), "[]");
}

#[tokio::test]
async fn test_repeated_invocation_is_idempotent() {
    let (registry, _) = build_registry().await;
    let tool = registry.get("list-dept").unwrap();
    let values = tool
        .parse_params(&args(json!({"dept": "Engineering"})), &ClaimMap::new())
        .unwrap();

    let first = tool.invoke(&QueryContext::new(), &values).await.unwrap();
    let second = tool.invoke(&QueryContext::new(), &values).await.unwrap();
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

#[tokio::test]
async fn test_template_and_bind_compose_in_one_statement() {
    let (registry, _) = build_registry().await;
    let tool = registry.get("pick-columns").unwrap();
    let values = tool
        .parse_params(
            &args(json!({"cols": ["name", "dept"], "min_salary": 90000.0})),
            &ClaimMap::new(),
        )
        .unwrap();

    let resolved = tool.resolve_statement(&values).unwrap();
    assert_eq!(
        resolved.sql,
        "SELECT name, dept FROM employees WHERE salary > ?1 ORDER BY id"
    );

    let records = tool.invoke(&QueryContext::new(), &values).await.unwrap();
    assert_eq!(records.len(), 2);
    let columns: Vec<&str> = records[0].columns().collect();
    assert_eq!(columns, vec!["name", "dept"]);
}

#[tokio::test]
async fn test_blob_bytes_come_back_as_text() {
    let (registry, _) = build_registry().await;
    let tool = registry.get("email-blob").unwrap();
    let values = tool
        .parse_params(&args(json!({"id": 1})), &ClaimMap::new())
        .unwrap();

    let records = tool.invoke(&QueryContext::new(), &values).await.unwrap();
    assert_eq!(
        records[0].get("email"),
        Some(&ScalarValue::Text("alice@example.com".to_string()))
    );
}

#[tokio::test]
async fn test_concurrent_invocations_stay_disjoint() {
    let (registry, observer) = build_registry().await;
    let list_dept = registry.get("list-dept").unwrap();
    let pick_columns = registry.get("pick-columns").unwrap();

    let sales: ParamValues = [("dept".to_string(), json!("Sales"))].into_iter().collect();
    let engineering: ParamValues = [("dept".to_string(), json!("Engineering"))]
        .into_iter()
        .collect();
    let columns: ParamValues = [
        ("cols".to_string(), json!(["id", "name"])),
        ("min_salary".to_string(), json!(0.0)),
    ]
    .into_iter()
    .collect();

    let sales_ctx = QueryContext::new();
    let engineering_ctx = QueryContext::new();
    let columns_ctx = QueryContext::new();
    let (a, b, c) = tokio::join!(
        list_dept.invoke(&sales_ctx, &sales),
        list_dept.invoke(&engineering_ctx, &engineering),
        pick_columns.invoke(&columns_ctx, &columns),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    let c = c.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(
        a[0].get("name"),
        Some(&ScalarValue::Text("Bob Johnson".to_string()))
    );
    assert_eq!(b.len(), 2);
    assert_eq!(c.len(), 4);
    assert_eq!(observer.events().len(), 3);
}
