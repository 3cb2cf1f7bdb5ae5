use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{Account, Currency, Engine, EngineError, Principal, Role, UserProfile};
use migration::MigratorTrait;

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (engine, db)
}

static FILE_DB_SEQ: AtomicU64 = AtomicU64::new(0);

async fn engine_with_file_db() -> (Engine, DatabaseConnection, std::path::PathBuf) {
    let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/test_dbs");
    std::fs::create_dir_all(&root).unwrap();

    let path = root.join(format!(
        "engine_{}_{}.db",
        std::process::id(),
        FILE_DB_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let url = format!("sqlite:{}?mode=rwc", path.display());

    let db = Database::connect(&url).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();

    (engine, db, path)
}

async fn admin_principal(db: &DatabaseConnection) -> Principal {
    let backend = db.get_database_backend();
    let result = db
        .execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO users (username, password, role) VALUES (?, ?, 'ADMIN')",
            vec!["root".into(), "password".into()],
        ))
        .await
        .unwrap();
    Principal::new(result.last_insert_id() as i64, Role::Admin)
}

fn regular(profile: &UserProfile) -> Principal {
    Principal::new(profile.id, Role::Regular)
}

fn account_in(profile: &UserProfile, currency: Currency) -> &Account {
    profile
        .accounts
        .iter()
        .find(|account| account.currency == currency)
        .expect("provisioned account missing")
}

#[tokio::test]
async fn create_user_provisions_zero_balance_accounts() {
    let (engine, _db) = engine_with_db().await;

    let alice = engine.create_user("alice", "password").await.unwrap();

    assert_eq!(alice.accounts.len(), Currency::ALL.len());
    for currency in Currency::ALL {
        let account = account_in(&alice, currency);
        assert_eq!(account.balance, 0);
        assert_eq!(account.user_id, alice.id);
    }
}

#[tokio::test]
async fn create_user_rejects_duplicate_username() {
    let (engine, _db) = engine_with_db().await;

    engine.create_user("alice", "password").await.unwrap();
    let err = engine.create_user("alice", "other").await.unwrap_err();
    assert_eq!(err, EngineError::ExistingKey("alice".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_duplicate_provisioning_reports_existing_key() {
    let (engine, _db, path) = engine_with_file_db().await;
    let engine = Arc::new(engine);

    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.create_user("alice", "password").await })
    };
    let second = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.create_user("alice", "password").await })
    };

    let mut ok = 0;
    for result in [first.await.unwrap(), second.await.unwrap()] {
        match result {
            Ok(profile) => {
                ok += 1;
                assert_eq!(profile.username, "alice");
            }
            Err(EngineError::ExistingKey(name)) => assert_eq!(name, "alice"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 1);

    drop(engine);
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn deposit_increases_balance() {
    let (engine, _db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    let principal = regular(&alice);
    let account_id = account_in(&alice, Currency::Rub).id;

    let account = engine.deposit(&principal, account_id, 100).await.unwrap();
    assert_eq!(account.balance, 100);

    let account = engine.deposit(&principal, account_id, 50).await.unwrap();
    assert_eq!(account.balance, 150);
}

#[tokio::test]
async fn withdraw_without_cover_fails_and_leaves_balance_unchanged() {
    let (engine, _db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    let principal = regular(&alice);
    let account_id = account_in(&alice, Currency::Rub).id;

    engine.deposit(&principal, account_id, 100).await.unwrap();

    let err = engine
        .withdraw(&principal, account_id, 200)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));

    let account = engine.account(&principal, account_id).await.unwrap();
    assert_eq!(account.balance, 100);

    let account = engine.withdraw(&principal, account_id, 100).await.unwrap();
    assert_eq!(account.balance, 0);
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let (engine, _db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    let principal = regular(&alice);
    let account_id = account_in(&alice, Currency::Rub).id;

    let err = engine.deposit(&principal, account_id, 0).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));

    let err = engine
        .withdraw(&principal, account_id, -5)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));
}

#[tokio::test]
async fn other_users_account_reads_as_missing() {
    let (engine, _db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    let bob = engine.create_user("bob", "password").await.unwrap();
    let account_id = account_in(&alice, Currency::Rub).id;

    let err = engine
        .account(&regular(&bob), account_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));

    let err = engine
        .deposit(&regular(&bob), account_id, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));

    let err = engine
        .withdraw(&regular(&bob), account_id, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn admins_cannot_touch_balances() {
    let (engine, db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    let admin = admin_principal(&db).await;
    let account_id = account_in(&alice, Currency::Rub).id;

    let err = engine.account(&admin, account_id).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = engine.deposit(&admin, account_id, 10).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = engine.withdraw(&admin, account_id, 10).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = engine
        .transfer(&admin, account_id, account_id + 1, alice.id, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn transfer_moves_money_and_conserves_total() {
    let (engine, _db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    let bob = engine.create_user("bob", "password").await.unwrap();
    let from = account_in(&alice, Currency::Rub).id;
    let to = account_in(&bob, Currency::Rub).id;

    engine.deposit(&regular(&alice), from, 300).await.unwrap();

    engine
        .transfer(&regular(&alice), from, to, bob.id, 120)
        .await
        .unwrap();

    let sender = engine.account(&regular(&alice), from).await.unwrap();
    let recipient = engine.account(&regular(&bob), to).await.unwrap();
    assert_eq!(sender.balance, 180);
    assert_eq!(recipient.balance, 120);
    assert_eq!(sender.balance + recipient.balance, 300);
}

#[tokio::test]
async fn transfer_to_same_account_is_rejected() {
    let (engine, _db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    let from = account_in(&alice, Currency::Rub).id;

    engine.deposit(&regular(&alice), from, 100).await.unwrap();

    let err = engine
        .transfer(&regular(&alice), from, from, alice.id, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SameAccount(_)));
}

#[tokio::test]
async fn transfer_across_currencies_is_rejected() {
    let (engine, _db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    let bob = engine.create_user("bob", "password").await.unwrap();
    let from = account_in(&alice, Currency::Rub).id;
    let to = account_in(&bob, Currency::Usd).id;

    engine.deposit(&regular(&alice), from, 100).await.unwrap();

    let err = engine
        .transfer(&regular(&alice), from, to, bob.id, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CurrencyMismatch(_)));

    let sender = engine.account(&regular(&alice), from).await.unwrap();
    let recipient = engine.account(&regular(&bob), to).await.unwrap();
    assert_eq!(sender.balance, 100);
    assert_eq!(recipient.balance, 0);
}

#[tokio::test]
async fn transfer_with_stale_recipient_binding_fails() {
    let (engine, _db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    let bob = engine.create_user("bob", "password").await.unwrap();
    let from = account_in(&alice, Currency::Rub).id;
    let to = account_in(&bob, Currency::Rub).id;

    engine.deposit(&regular(&alice), from, 100).await.unwrap();

    // Recipient account belongs to bob, not alice.
    let err = engine
        .transfer(&regular(&alice), from, to, alice.id, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));

    let sender = engine.account(&regular(&alice), from).await.unwrap();
    assert_eq!(sender.balance, 100);
}

#[tokio::test]
async fn transfer_without_cover_fails_atomically() {
    let (engine, _db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    let bob = engine.create_user("bob", "password").await.unwrap();
    let from = account_in(&alice, Currency::Rub).id;
    let to = account_in(&bob, Currency::Rub).id;

    engine.deposit(&regular(&alice), from, 50).await.unwrap();

    let err = engine
        .transfer(&regular(&alice), from, to, bob.id, 100)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));

    let sender = engine.account(&regular(&alice), from).await.unwrap();
    let recipient = engine.account(&regular(&bob), to).await.unwrap();
    assert_eq!(sender.balance, 50);
    assert_eq!(recipient.balance, 0);
}

#[tokio::test]
async fn accounts_for_returns_only_own_accounts() {
    let (engine, _db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    let bob = engine.create_user("bob", "password").await.unwrap();

    let accounts = engine.accounts_for(&regular(&alice)).await.unwrap();
    assert_eq!(accounts.len(), Currency::ALL.len());
    assert!(accounts.iter().all(|account| account.user_id == alice.id));
    assert!(accounts.iter().all(|account| account.user_id != bob.id));
}

#[tokio::test]
async fn list_users_is_admin_only() {
    let (engine, db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    engine.create_user("bob", "password").await.unwrap();
    let admin = admin_principal(&db).await;

    let err = engine.list_users(&regular(&alice)).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let users = engine.list_users(&admin).await.unwrap();
    let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
    assert!(names.contains(&"alice"));
    assert!(names.contains(&"bob"));
}

#[tokio::test]
async fn me_returns_own_profile_only() {
    let (engine, db) = engine_with_db().await;
    let alice = engine.create_user("alice", "password").await.unwrap();
    let admin = admin_principal(&db).await;

    let profile = engine.me(&regular(&alice)).await.unwrap();
    assert_eq!(profile.username, "alice");
    assert_eq!(profile.accounts.len(), Currency::ALL.len());

    let err = engine.me(&admin).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_withdrawals_never_overdraw() {
    let (engine, _db, path) = engine_with_file_db().await;
    let engine = Arc::new(engine);

    let alice = engine.create_user("alice", "password").await.unwrap();
    let principal = regular(&alice);
    let account_id = account_in(&alice, Currency::Rub).id;
    engine
        .deposit(&principal, account_id, 500)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            // Conflict is the one retryable outcome; every withdrawal must
            // terminate in success or insufficient funds.
            loop {
                match engine.withdraw(&principal, account_id, 100).await {
                    Err(EngineError::Conflict(_)) => continue,
                    other => break other,
                }
            }
        }));
    }

    let mut ok = 0i64;
    let mut insufficient = 0i64;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => ok += 1,
            Err(EngineError::InsufficientFunds(_)) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // 500 covers exactly five withdrawals of 100.
    assert_eq!(ok, 5);
    assert_eq!(insufficient, 5);
    let account = engine.account(&principal, account_id).await.unwrap();
    assert_eq!(account.balance, 0);

    drop(engine);
    let _ = std::fs::remove_file(path);
}

#[tokio::test(flavor = "multi_thread")]
async fn opposing_concurrent_transfers_conserve_total() {
    let (engine, _db, path) = engine_with_file_db().await;
    let engine = Arc::new(engine);

    let alice = engine.create_user("alice", "password").await.unwrap();
    let bob = engine.create_user("bob", "password").await.unwrap();
    let alice_account = account_in(&alice, Currency::Rub).id;
    let bob_account = account_in(&bob, Currency::Rub).id;

    engine
        .deposit(&regular(&alice), alice_account, 1000)
        .await
        .unwrap();
    engine
        .deposit(&regular(&bob), bob_account, 1000)
        .await
        .unwrap();

    let forward = {
        let engine = Arc::clone(&engine);
        let principal = regular(&alice);
        let to_user = bob.id;
        tokio::spawn(async move {
            engine
                .transfer(&principal, alice_account, bob_account, to_user, 300)
                .await
        })
    };
    let backward = {
        let engine = Arc::clone(&engine);
        let principal = regular(&bob);
        let to_user = alice.id;
        tokio::spawn(async move {
            engine
                .transfer(&principal, bob_account, alice_account, to_user, 200)
                .await
        })
    };

    for result in [forward.await.unwrap(), backward.await.unwrap()] {
        match result {
            Ok(()) | Err(EngineError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let alice_balance = engine
        .account(&regular(&alice), alice_account)
        .await
        .unwrap()
        .balance;
    let bob_balance = engine
        .account(&regular(&bob), bob_account)
        .await
        .unwrap()
        .balance;
    assert_eq!(alice_balance + bob_balance, 2000);

    drop(engine);
    let _ = std::fs::remove_file(path);
}
