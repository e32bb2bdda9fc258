#![cfg(feature = "sqlite")]

use std::time::Duration;

use futures::TryStreamExt;
use sqlcontext::database::context::{ContextOptions, DataContext, DbContext};
use sqlcontext::database::entity::{Entity, TableMap, Value};
use sqlcontext::database::error::{ConstraintKind, DatabaseErrorKind};
use sqlcontext::database::factory::PooledConnectionFactory;
use sqlcontext::database::filter::{Column, Filter};
use sqlcontext::database::repository::{EntityRepository, Repository, TransactionalRepository};
use sqlcontext::database::statement::Pagination;
use sqlcontext::database::transaction::IsolationLevel;
use sqlcontext::database::PoolConfig;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
struct Customer {
    id: String,
    name: String,
    email: Option<String>,
    balance: f64,
}

impl Customer {
    fn new(id: &str, name: &str, email: Option<&str>, balance: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            email: email.map(str::to_string),
            balance,
        }
    }
}

impl Entity for Customer {
    const TABLE: Option<&'static str> = Some("customers");

    fn key(&self) -> Value {
        self.id.clone().into()
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("name", self.name.clone().into()),
            ("email", self.email.clone().into()),
            ("balance", self.balance.into()),
        ]
    }
}

/// Table comes from the configured mapping
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
struct Ticket {
    ticket_id: Option<i64>,
    subject: String,
}

impl Entity for Ticket {
    const KEY: &'static str = "ticket_id";
    const GENERATED_KEY: bool = true;

    fn key(&self) -> Value {
        self.ticket_id.into()
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![("subject", self.subject.clone().into())]
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
struct Transfer {
    id: String,
    account_id: String,
}

impl Entity for Transfer {
    const TABLE: Option<&'static str> = Some("transfers");

    fn key(&self) -> Value {
        self.id.clone().into()
    }

    fn columns(&self) -> Vec<(&'static str, Value)> {
        vec![("account_id", self.account_id.clone().into())]
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NameRow {
    name: String,
}

const NAME: Column<String> = Column::new("name");
const BALANCE: Column<f64> = Column::new("balance");

fn memory_pool_config() -> PoolConfig {
    // A single long-lived connection keeps the in-memory database alive
    PoolConfig {
        max_connections: 1,
        min_connections: 1,
        connection_timeout: Duration::from_secs(5),
        idle_timeout: None,
        max_lifetime: None,
        lazy: false,
    }
}

async fn setup() -> DbContext {
    let factory = PooledConnectionFactory::new("sqlite::memory:", memory_pool_config());
    let options = ContextOptions {
        tables: TableMap::new().with("ticket", "support_tickets"),
        ..Default::default()
    };
    let mut ctx = DbContext::connect(&factory, options)
        .await
        .expect("Failed to connect");

    ctx.execute_sql(
        "CREATE TABLE customers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT UNIQUE,
            balance REAL NOT NULL
        )",
        vec![],
    )
    .await
    .expect("Failed to create customers");

    ctx.execute_sql(
        "CREATE TABLE support_tickets (
            ticket_id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject TEXT NOT NULL
        )",
        vec![],
    )
    .await
    .expect("Failed to create support_tickets");

    ctx
}

async fn seed(ctx: &mut DbContext) {
    let customers = vec![
        Customer::new("c-3", "Carol", Some("carol@example.com"), 30.0),
        Customer::new("c-1", "Alice", Some("alice@example.com"), 10.0),
        Customer::new("c-2", "Bob", None, 20.0),
    ];
    let inserted = ctx.create_many(&customers).await.unwrap();
    assert_eq!(inserted, 3);
}

#[tokio::test]
async fn test_create_then_get_by_key_returns_equal_entity() {
    let mut ctx = setup().await;
    let alice = Customer::new("c-1", "Alice", Some("alice@example.com"), 12.5);

    assert!(ctx.create(&alice).await.unwrap());

    let loaded: Option<Customer> = ctx.get_by_key_id("c-1".into()).await.unwrap();
    assert_eq!(loaded, Some(alice));

    let missing: Option<Customer> = ctx.get_by_key_id("nope".into()).await.unwrap();
    assert!(missing.is_none());

    ctx.close().await;
}

#[tokio::test]
async fn test_update_changes_stored_row() {
    let mut ctx = setup().await;
    let mut bob = Customer::new("c-2", "Bob", None, 20.0);
    ctx.create(&bob).await.unwrap();

    bob.email = Some("bob@example.com".to_string());
    bob.balance = 25.0;
    assert!(ctx.update(&bob).await.unwrap());

    let loaded: Option<Customer> = ctx.get_by_key_id("c-2".into()).await.unwrap();
    assert_eq!(loaded, Some(bob));

    let ghost = Customer::new("c-404", "Ghost", None, 0.0);
    assert!(!ctx.update(&ghost).await.unwrap());
}

#[tokio::test]
async fn test_delete_then_exist_is_false() {
    let mut ctx = setup().await;
    let carol = Customer::new("c-3", "Carol", None, 1.0);
    ctx.create(&carol).await.unwrap();

    let by_key = Filter::eq("id", "c-3");
    assert!(ctx.exist::<Customer>(Some(&by_key)).await.unwrap());

    assert!(ctx.delete(&carol).await.unwrap());
    assert!(!ctx.exist::<Customer>(Some(&by_key)).await.unwrap());

    // Second delete touches nothing
    assert!(!ctx.delete(&carol).await.unwrap());
}

#[tokio::test]
async fn test_get_list_is_ordered_by_key_and_filtered() {
    let mut ctx = setup().await;
    seed(&mut ctx).await;

    let all: Vec<Customer> = ctx.get_list(None).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c-1", "c-2", "c-3"]);

    let rich: Vec<Customer> = ctx.get_list(Some(&BALANCE.gte(20.0))).await.unwrap();
    assert_eq!(rich.len(), 2);

    let no_email: Vec<Customer> = ctx
        .get_list(Some(&Filter::is_null("email")))
        .await
        .unwrap();
    assert_eq!(no_email.len(), 1);
    assert_eq!(no_email[0].name, "Bob");

    let combined = NAME.like("%o%") & !Filter::eq("id", "c-2");
    let matched: Vec<Customer> = ctx.get_list(Some(&combined)).await.unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].name, "Carol");

    let listed = Filter::is_in("id", vec!["c-1", "c-3"]);
    let found: Vec<Customer> = ctx.get_list(Some(&listed)).await.unwrap();
    assert_eq!(found.len(), 2);

    let none: Vec<Customer> = ctx
        .get_list(Some(&Filter::is_in("id", Vec::<String>::new())))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_first_page_and_count() {
    let mut ctx = setup().await;
    seed(&mut ctx).await;

    let first: Option<Customer> = ctx.get_first_or_default(None).await.unwrap();
    assert_eq!(first.map(|c| c.id), Some("c-1".to_string()));

    let nobody: Option<Customer> = ctx
        .get_first_or_default(Some(&BALANCE.gt(1000.0)))
        .await
        .unwrap();
    assert!(nobody.is_none());

    let page: Vec<Customer> = ctx
        .get_page(None, Pagination::page(1, 2))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, "c-3");

    assert_eq!(ctx.count::<Customer>(None).await.unwrap(), 3);
    assert_eq!(
        ctx.count::<Customer>(Some(&BALANCE.lt(15.0))).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_generated_key_and_configured_table() {
    let mut ctx = setup().await;
    let ticket = Ticket {
        ticket_id: None,
        subject: "Printer on fire".to_string(),
    };

    assert!(ctx.create(&ticket).await.unwrap());

    let stored: Vec<Ticket> = ctx.get_list(None).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ticket_id.is_some());
    assert_eq!(stored[0].subject, "Printer on fire");
}

#[tokio::test]
async fn test_rollback_discards_changes() {
    let ctx = setup().await;

    let mut tx = ctx.begin_transaction(None).await.unwrap();
    assert!(tx.is_active());
    tx.create(&Customer::new("c-9", "Temp", None, 9.0))
        .await
        .unwrap();
    let inside: Option<Customer> = tx.get_by_key_id("c-9".into()).await.unwrap();
    assert!(inside.is_some());
    tx.rollback().await.unwrap();
    assert!(!tx.is_active());

    let mut ctx = ctx;
    let after: Option<Customer> = ctx.get_by_key_id("c-9".into()).await.unwrap();
    assert!(after.is_none());
}

#[tokio::test]
async fn test_commit_persists_changes() {
    let ctx = setup().await;

    let mut tx = ctx.unit_of_work();
    tx.begin(None).await.unwrap();
    // Already open: ignored
    tx.begin(None).await.unwrap();
    tx.create(&Customer::new("c-7", "Kept", None, 7.0))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    tx.dispose().await.unwrap();

    let mut ctx = ctx;
    assert_eq!(ctx.count::<Customer>(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_commit_failure_is_wrapped_and_discards_changes() {
    let mut ctx = setup().await;
    ctx.execute_sql("PRAGMA foreign_keys = ON", vec![])
        .await
        .unwrap();
    ctx.execute_sql("CREATE TABLE accounts (id TEXT PRIMARY KEY)", vec![])
        .await
        .unwrap();
    ctx.execute_sql(
        "CREATE TABLE transfers (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL
                REFERENCES accounts (id) DEFERRABLE INITIALLY DEFERRED
        )",
        vec![],
    )
    .await
    .unwrap();

    let mut tx = ctx.begin_transaction(None).await.unwrap();
    let orphan = Transfer {
        id: "t-1".to_string(),
        account_id: "missing".to_string(),
    };
    // Deferred: the violation only surfaces at commit
    assert!(tx.create(&orphan).await.unwrap());

    let err = tx.commit().await.unwrap_err();
    assert!(!tx.is_active());
    assert_eq!(err.code(), Some("787"));
    assert_eq!(err.context.as_deref(), Some("commit"));
    match &err.kind {
        DatabaseErrorKind::ConstraintViolation {
            constraint,
            message,
            ..
        } => {
            assert_eq!(*constraint, ConstraintKind::ForeignKey);
            assert_eq!(message, "The operation references a record that does not exist");
        }
        other => panic!("unexpected error kind: {:?}", other),
    }
    assert!(err.driver_error().is_some());
    drop(tx);

    assert_eq!(ctx.count::<Transfer>(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_isolation_level_is_accepted_on_sqlite() {
    let ctx = setup().await;

    let mut tx = ctx
        .begin_transaction(Some(IsolationLevel::Serializable))
        .await
        .unwrap();
    assert!(tx.is_active());
    tx.create(&Customer::new("c-8", "Serial", None, 8.0))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    drop(tx);

    let mut ctx = ctx;
    let stored: Option<Customer> = ctx.get_by_key_id("c-8".into()).await.unwrap();
    assert_eq!(stored.map(|c| c.name), Some("Serial".to_string()));
}

#[tokio::test]
async fn test_commit_and_rollback_without_transaction_are_noops() {
    let ctx = setup().await;
    let mut tx = ctx.unit_of_work();

    assert!(tx.commit().await.is_ok());
    assert!(tx.rollback().await.is_ok());
    assert!(tx.dispose().await.is_ok());
    assert!(tx.dispose().await.is_ok());

    // Without a transaction the handle runs on the pool
    assert!(tx
        .create(&Customer::new("c-5", "Eve", None, 5.0))
        .await
        .unwrap());
    drop(tx);

    let mut ctx = ctx;
    assert_eq!(ctx.count::<Customer>(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_unique_value_is_constraint_violation() {
    let mut ctx = setup().await;
    ctx.create(&Customer::new("c-1", "Alice", Some("same@example.com"), 1.0))
        .await
        .unwrap();

    let err = ctx
        .create(&Customer::new("c-2", "Mallory", Some("same@example.com"), 1.0))
        .await
        .unwrap_err();

    assert!(err.is_constraint_violation());
    assert_eq!(err.code(), Some("2067"));
    assert!(matches!(
        err.kind,
        DatabaseErrorKind::ConstraintViolation {
            constraint: ConstraintKind::Unique,
            ..
        }
    ));
    assert!(err.driver_error().is_some());

    let err = ctx
        .create(&Customer::new("c-1", "Alice again", None, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind,
        DatabaseErrorKind::ConstraintViolation {
            constraint: ConstraintKind::PrimaryKey,
            ..
        }
    ));
}

#[tokio::test]
async fn test_sql_query_streams_fixture_rows() {
    let mut ctx = setup().await;
    seed(&mut ctx).await;

    let rows: Vec<NameRow> = ctx
        .sql_query(
            "SELECT name FROM customers WHERE balance > ? ORDER BY name",
            vec![15.0.into()],
        )
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let names: Vec<String> = rows.into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["Bob", "Carol"]);

    let listed: Vec<NameRow> = ctx
        .sql_query_list("SELECT name FROM customers WHERE id = ?", vec!["c-1".into()])
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Alice");
}

#[tokio::test]
async fn test_blank_sql_fails_validation() {
    let mut ctx = setup().await;

    let err = ctx.sql_query::<NameRow>("", vec![]).err().unwrap();
    assert!(err.is_validation());

    let err = ctx.sql_query_list::<NameRow>("   ", vec![]).await.unwrap_err();
    assert!(err.is_validation());

    let err = ctx.execute_sql("", vec![]).await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_invalid_identifier_fails_validation() {
    let mut ctx = setup().await;
    let filter = Filter::eq("name; DROP TABLE customers", "x");

    let err = ctx.get_list::<Customer>(Some(&filter)).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(ctx.count::<Customer>(None).await.unwrap(), 0);
}

#[cfg(feature = "postgres")]
#[tokio::test]
async fn test_null_keys_fail_before_io() {
    // Nothing listens here; any I/O would surface as a pool or transport error
    let config = PoolConfig {
        max_connections: 1,
        min_connections: 0,
        connection_timeout: Duration::from_secs(1),
        idle_timeout: None,
        max_lifetime: None,
        lazy: true,
    };
    let factory = PooledConnectionFactory::new("postgres://nobody@127.0.0.1:1/none", config);
    let mut ctx = DbContext::connect(&factory, ContextOptions::default())
        .await
        .unwrap();

    let keyless = Customer {
        id: String::new(),
        name: "Nobody".to_string(),
        email: None,
        balance: 0.0,
    };
    let ticket = Ticket {
        ticket_id: None,
        subject: "no key".to_string(),
    };

    let err = ctx.update(&ticket).await.unwrap_err();
    assert!(err.is_validation());
    let err = ctx.delete(&ticket).await.unwrap_err();
    assert!(err.is_validation());
    let err = ctx.get_by_key_id::<Customer>(Value::Null).await.unwrap_err();
    assert!(err.is_validation());
    let err = ctx.sql_query::<NameRow>(" ", vec![]).err().unwrap();
    assert!(err.is_validation());

    // An empty string is a real key value; this one does reach the driver
    let err = ctx.create(&keyless).await.unwrap_err();
    assert!(!err.is_validation());
}

#[tokio::test]
async fn test_repository_round_trip() {
    let ctx = setup().await;
    let repo: EntityRepository<Customer> = EntityRepository::new(ctx.clone());
    let dave = Customer::new("c-4", "Dave", None, 4.0);

    assert!(repo.insert(&dave).await.unwrap());
    assert!(repo.exists("c-4".into()).await.unwrap());
    assert_eq!(repo.find_by_id("c-4".into()).await.unwrap(), Some(dave.clone()));
    assert_eq!(repo.find_all().await.unwrap().len(), 1);
    assert_eq!(
        repo.find_where(&Filter::eq("name", "Dave")).await.unwrap(),
        vec![dave.clone()]
    );
    assert!(repo.exists(Value::Null).await.unwrap_err().is_validation());

    let mut tx = repo.begin(None).await.unwrap();
    assert!(tx.delete(&dave).await.unwrap());
    tx.rollback().await.unwrap();
    drop(tx);

    assert!(repo.exists("c-4".into()).await.unwrap());
    assert!(repo.delete(&dave).await.unwrap());
    assert!(!repo.exists("c-4".into()).await.unwrap());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let ctx = setup().await;
    assert!(!ctx.is_closed());
    ctx.close().await;
    ctx.close().await;
    assert!(ctx.is_closed());
}
