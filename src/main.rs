//! Remit Engine - demo runner
//!
//! Wires the engine to in-memory collaborators and runs two scenarios:
//!
//! ```text
//! 1. internal  A-100 (5000) --2000--> A-200 (1000)     => COMPLETED
//! 2. external  A-101 --100000--> partner bank (Error)  => FAILED, EXTERNAL_API_ERROR
//! ```
//!
//! When `postgres_url` is configured, balances and transfer records go to
//! PostgreSQL.

use std::sync::Arc;

use rust_decimal::Decimal;

use remit_engine::config::AppConfig;
use remit_engine::transfer::adapters::{
    InMemoryAccounts, InMemoryLedger, InMemoryTransferStore, PgLedger, PgTransferStore,
    RecordingAuditLog, RecordingNotifier, ScriptedBankingGateway, StaticPinSessions,
    TransferStore, UnitOfWork,
};
use remit_engine::transfer::adapters::{BalanceLedger, TransferPorts};
use remit_engine::transfer::{
    Account, BankingResponse, ExternalTransferRequest, TransferError, TransferRequest,
    TransferService, User,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

const OPENING_BALANCES: [(&str, i64); 3] = [("A-100", 5000), ("A-101", 500_000), ("A-200", 1000)];

/// Ledger, unit of work and record store
struct Storage {
    ledger: Arc<dyn BalanceLedger>,
    work: Arc<dyn UnitOfWork>,
    store: Arc<dyn TransferStore>,
}

async fn storage(config: &AppConfig) -> anyhow::Result<Storage> {
    match &config.postgres_url {
        Some(url) => {
            tracing::info!("Using PostgreSQL ledger and transfer store");
            let ledger = Arc::new(PgLedger::connect(url).await?);
            for (account, balance) in OPENING_BALANCES {
                ledger.open_account(account, Decimal::from(balance)).await?;
            }
            Ok(Storage {
                ledger: ledger.clone(),
                work: ledger,
                store: Arc::new(PgTransferStore::connect(url).await?),
            })
        }
        None => {
            let ledger = Arc::new(InMemoryLedger::new());
            for (account, balance) in OPENING_BALANCES {
                ledger.set_balance(account, Decimal::from(balance)).await;
            }
            Ok(Storage {
                ledger: ledger.clone(),
                work: ledger,
                store: Arc::new(InMemoryTransferStore::new()),
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = remit_engine::logging::init_logging(&app_config);

    tracing::info!("Starting Remit Engine in {} mode", env);

    let accounts = Arc::new(InMemoryAccounts::new());
    accounts.add_user(User {
        id: 1,
        handle: "010-1000-0001".into(),
    });
    accounts.add_user(User {
        id: 2,
        handle: "010-1000-0002".into(),
    });
    accounts.add_account(Account {
        id: 100,
        account_number: "A-100".into(),
        user_id: 1,
    });
    accounts.add_account(Account {
        id: 101,
        account_number: "A-101".into(),
        user_id: 1,
    });
    accounts.add_account(Account {
        id: 200,
        account_number: "A-200".into(),
        user_id: 2,
    });

    let storage = storage(&app_config).await?;
    let ledger = storage.ledger.clone();

    let gateway = Arc::new(ScriptedBankingGateway::default());
    gateway
        .push_response(BankingResponse::error("INSUFFICIENT_FUNDS_AT_BANK"))
        .await;

    let ports = TransferPorts {
        accounts,
        ledger: storage.ledger,
        work: storage.work,
        store: storage.store,
        audit: Arc::new(RecordingAuditLog::new()),
        notifier: Arc::new(RecordingNotifier::new()),
    };
    let service = TransferService::new(
        ports,
        gateway,
        Arc::new(StaticPinSessions::new()),
        &app_config.transfer,
    )?;
    tracing::info!(status = ?service.status(), "Transfer engine ready");

    // Scenario 1: internal transfer
    let record = service
        .transfer(
            "010-1000-0001",
            TransferRequest {
                sender_account_number: Some("A-100".into()),
                receiver_account_number: "A-200".into(),
                amount: Decimal::from(2000),
                memo: "rent".into(),
            },
        )
        .await?;
    tracing::info!(
        transaction_id = %record.transaction_id,
        state = %record.state,
        "Internal transfer finished"
    );

    // Scenario 2: external transfer refused by the partner bank
    let outcome = service
        .external_transfer(
            "010-1000-0001",
            ExternalTransferRequest {
                sender_account_number: Some("A-101".into()),
                receiver_account_number: "088-555-0101".into(),
                receiver_bank_code: "088".into(),
                receiver_bank_name: "Partner bank".into(),
                amount: Decimal::from(100_000),
                memo: "tuition".into(),
            },
        )
        .await;
    match outcome {
        Ok(record) => tracing::warn!(state = %record.state, "External transfer unexpectedly accepted"),
        Err(TransferError::TransactionFailed {
            transaction_id,
            code,
            cause,
        }) => tracing::info!(%transaction_id, code, %cause, "External transfer failed"),
        Err(e) => return Err(e.into()),
    }

    for account in ["A-100", "A-101", "A-200"] {
        let balance = ledger.balance(account).await?;
        tracing::info!(account, %balance, "Final balance");
    }

    Ok(())
}
