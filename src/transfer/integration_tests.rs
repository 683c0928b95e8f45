//! Integration Tests for the transfer engine
//!
//! Every test wires the real actions, resolver and processor to the
//! in-memory collaborators, then drives a scenario end to end.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::config::TransferConfig;
use crate::core_types::TransactionId;
use crate::transfer::adapters::{
    BalanceLedger, InMemoryAccounts, InMemoryLedger, InMemoryTransferStore, PIN_SCOPE_TRANSFER,
    RecordingAuditLog, RecordingNotifier, ScriptedBankingGateway, StaticPinSessions,
    TransferPorts, TransferStore,
};
use crate::transfer::command::{ExternalTransfer, InternalTransfer, SecureTransfer, TransferCommand};
use crate::transfer::error::TransferError;
use crate::transfer::result::{ActionResult, codes};
use crate::transfer::service::{SecureTransferRequest, TransferRequest, TransferService};
use crate::transfer::state::TransferState;
use crate::transfer::types::{
    Account, AuditEventType, BankingResponse, LedgerEntryKind, Page, TransferKind,
    TransferRecord, User,
};

const ALICE: u64 = 1;
const BOB: u64 = 2;
const ALICE_PHONE: &str = "010-1000-0001";
const BOB_PHONE: &str = "010-1000-0002";

/// Engine plus handles on every in-memory collaborator
struct TestHarness {
    service: TransferService,
    accounts: Arc<InMemoryAccounts>,
    ledger: Arc<InMemoryLedger>,
    store: Arc<InMemoryTransferStore>,
    audit: Arc<RecordingAuditLog>,
    notifier: Arc<RecordingNotifier>,
    gateway: Arc<ScriptedBankingGateway>,
    pins: Arc<StaticPinSessions>,
}

impl TestHarness {
    /// Alice owns A-100 (id 100) and A-300 (id 300), Bob owns A-200 (id 200)
    async fn new(alice_balance: i64, bob_balance: i64) -> Self {
        let accounts = Arc::new(InMemoryAccounts::new());
        accounts.add_user(User {
            id: ALICE,
            handle: ALICE_PHONE.into(),
        });
        accounts.add_user(User {
            id: BOB,
            handle: BOB_PHONE.into(),
        });
        for (id, number, owner) in [(100, "A-100", ALICE), (200, "A-200", BOB), (300, "A-300", ALICE)] {
            accounts.add_account(Account {
                id,
                account_number: number.into(),
                user_id: owner,
            });
        }

        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_balance("A-100", Decimal::from(alice_balance)).await;
        ledger.set_balance("A-200", Decimal::from(bob_balance)).await;
        ledger.set_balance("A-300", Decimal::ZERO).await;

        let store = Arc::new(InMemoryTransferStore::new());
        let audit = Arc::new(RecordingAuditLog::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let gateway = Arc::new(ScriptedBankingGateway::default());
        let pins = Arc::new(StaticPinSessions::new());

        let ports = TransferPorts {
            accounts: accounts.clone(),
            ledger: ledger.clone(),
            work: ledger.clone(),
            store: store.clone(),
            audit: audit.clone(),
            notifier: notifier.clone(),
        };
        let service = TransferService::new(
            ports,
            gateway.clone(),
            pins.clone(),
            &TransferConfig::default(),
        )
        .unwrap();

        Self {
            service,
            accounts,
            ledger,
            store,
            audit,
            notifier,
            gateway,
            pins,
        }
    }

    async fn balance(&self, account_number: &str) -> Decimal {
        self.ledger.balance(account_number).await.unwrap()
    }

    async fn record(&self, tx: &str) -> TransferRecord {
        self.store
            .find_by_transaction_id(&TransactionId::from(tx))
            .await
            .unwrap()
            .unwrap()
    }

    async fn process(&self, command: TransferCommand) -> Result<ActionResult, TransferError> {
        self.service.processor().process(&command).await
    }
}

fn internal(tx: &str, from: (u64, &str), to: (u64, &str), amount: i64) -> TransferCommand {
    InternalTransfer {
        sender_id: from.0,
        receiver_id: to.0,
        sender_account_number: from.1.into(),
        receiver_account_number: to.1.into(),
        amount: Decimal::from(amount),
        memo: "lunch".into(),
        transaction_id: tx.into(),
    }
    .into()
}

fn external(tx: &str, amount: i64) -> TransferCommand {
    ExternalTransfer {
        sender_id: ALICE,
        sender_account_number: "A-100".into(),
        receiver_account_number: "088-555-0101".into(),
        receiver_bank_code: "088".into(),
        receiver_bank_name: "Partner bank".into(),
        amount: Decimal::from(amount),
        memo: "tuition".into(),
        transaction_id: tx.into(),
    }
    .into()
}

fn secure(tx: &str, token: &str, is_external: bool, amount: i64) -> TransferCommand {
    let cmd = SecureTransfer {
        sender_id: ALICE,
        receiver_id: if is_external { None } else { Some(BOB) },
        sender_account_number: "A-100".into(),
        receiver_account_number: if is_external {
            "088-555-0101".into()
        } else {
            "A-200".into()
        },
        amount: Decimal::from(amount),
        memo: "gift".into(),
        transaction_id: tx.into(),
        pin_session_token: token.into(),
        is_external,
        receiver_bank_code: is_external.then(|| "088".to_string()),
        receiver_bank_name: None,
    };
    TransferCommand::from(cmd)
}

// ============================================================================
// Internal transfers
// ============================================================================

#[tokio::test]
async fn test_internal_transfer_happy_path() {
    let h = TestHarness::new(5000, 1000).await;

    let result = h
        .process(internal("TXN-INT-1", (ALICE, "A-100"), (BOB, "A-200"), 2000))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.code(), codes::OK);
    assert_eq!(h.balance("A-100").await, Decimal::from(3000));
    assert_eq!(h.balance("A-200").await, Decimal::from(3000));

    let record = h.record("TXN-INT-1").await;
    assert_eq!(record.state, TransferState::Completed);
    assert_eq!(record.kind, TransferKind::Internal);

    let entries = h.ledger.entries_for(&"TXN-INT-1".into()).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, LedgerEntryKind::TransferOut);
    assert_eq!(entries[0].account_number, "A-100");
    assert_eq!(entries[1].kind, LedgerEntryKind::TransferIn);
    assert_eq!(entries[1].account_number, "A-200");

    let successes = h.audit.successes().await;
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].event_type, AuditEventType::TransferSuccess);
    assert_eq!(successes[0].actor_handle, ALICE_PHONE);

    let sent = h.notifier.sent().await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].user_id, ALICE);
    assert_eq!(sent[1].user_id, BOB);
}

#[tokio::test]
async fn test_rejected_command_leaves_no_record() {
    let h = TestHarness::new(5000, 1000).await;

    let cases = [
        (internal("TXN-R-1", (ALICE, "A-100"), (BOB, "A-200"), 0), "INVALID_AMOUNT"),
        (internal("TXN-R-2", (ALICE, "A-100"), (BOB, "A-200"), 9000), "INSUFFICIENT_FUNDS"),
        (internal("TXN-R-3", (ALICE, "A-100"), (ALICE, "A-300"), 10), "SELF_TRANSFER"),
        (internal("TXN-R-4", (ALICE, "A-100"), (BOB, "A-999"), 10), "INVALID_ACCOUNT_NUMBER"),
        (internal("TXN-R-5", (BOB, "A-100"), (ALICE, "A-300"), 10), "NOT_ACCOUNT_OWNER"),
        (internal("TXN-R-6", (ALICE, "A-404"), (BOB, "A-200"), 10), "ACCOUNT_NOT_FOUND"),
    ];

    for (command, code) in cases {
        let tx = command.transaction_id().clone();
        let result = h.process(command).await.unwrap();
        assert!(result.is_failure(), "{} should be rejected", tx);
        assert_eq!(result.code(), code, "{}", tx);
        assert!(!h.store.exists_by_transaction_id(&tx).await.unwrap());
    }

    assert!(h.store.is_empty());
    assert!(h.ledger.journal().await.is_empty());
    assert!(h.audit.failures().await.is_empty());
    assert_eq!(h.balance("A-100").await, Decimal::from(5000));
}

#[tokio::test]
async fn test_locks_taken_in_ascending_account_order() {
    let h = TestHarness::new(5000, 1000).await;

    // receiver (100) has the lower id
    let result = h
        .process(internal("TXN-ORD-1", (BOB, "A-200"), (ALICE, "A-100"), 500))
        .await
        .unwrap();
    assert!(result.is_success());
    assert_eq!(h.accounts.lock_history().await, vec![100, 200]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_direction_transfers_do_not_deadlock() {
    let h = Arc::new(TestHarness::new(10_000, 10_000).await);

    let mut tasks = Vec::new();
    for i in 0..20 {
        let h1 = h.clone();
        tasks.push(tokio::spawn(async move {
            h1.process(internal(&format!("TXN-AB-{}", i), (ALICE, "A-100"), (BOB, "A-200"), 100))
                .await
        }));
        let h2 = h.clone();
        tasks.push(tokio::spawn(async move {
            h2.process(internal(&format!("TXN-BA-{}", i), (BOB, "A-200"), (ALICE, "A-100"), 100))
                .await
        }));
    }

    let outcomes = tokio::time::timeout(Duration::from_secs(10), async {
        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }
        outcomes
    })
    .await
    .expect("transfers deadlocked");

    for outcome in outcomes {
        assert!(outcome.unwrap().is_success());
    }
    assert_eq!(h.balance("A-100").await, Decimal::from(10_000));
    assert_eq!(h.balance("A-200").await, Decimal::from(10_000));
    assert_eq!(h.store.len(), 40);
    assert_eq!(h.ledger.journal().await.len(), 80);

    // 200 is only ever taken while holding 100
    let history = h.accounts.lock_history().await;
    assert_eq!(history.len(), 80);
    assert!(history.chunks(2).all(|pair| pair == [100, 200]));
}

#[tokio::test]
async fn test_refused_credit_rolls_back_debit() {
    let h = TestHarness::new(5000, 1000).await;
    // every credit is refused
    for account in ["A-100", "A-200", "A-300"] {
        h.ledger.freeze_credits(account);
    }

    let result = h
        .process(internal("TXN-ROLL-1", (ALICE, "A-100"), (BOB, "A-200"), 2000))
        .await
        .unwrap();

    assert!(result.is_failure());
    assert_eq!(result.code(), codes::INTERNAL_TRANSFER_ERROR);
    assert_eq!(h.balance("A-100").await, Decimal::from(5000));
    assert_eq!(h.balance("A-200").await, Decimal::from(1000));
    assert!(h.ledger.entries_for(&"TXN-ROLL-1".into()).await.is_empty());
    assert_eq!(h.ledger.open_units().await, 0);

    let record = h.record("TXN-ROLL-1").await;
    assert_eq!(record.state, TransferState::Failed);
    assert!(record.reason.is_some());
    assert_eq!(h.audit.failures().await.len(), 1);
    assert!(h.notifier.sent().await.is_empty());
}

#[tokio::test]
async fn test_unmatched_debit_is_never_reported_failed() {
    let h = TestHarness::new(5000, 1000).await;
    h.ledger.freeze_credits("A-200");
    h.ledger.set_fail_rollback(true);

    let err = h
        .process(internal("TXN-ROLL-2", (ALICE, "A-100"), (BOB, "A-200"), 2000))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransferError::TransactionFailed { code: "LEDGER_ERROR", .. }
    ));
    // the debit could not be undone: the record stays open for reconciliation
    assert_eq!(h.balance("A-100").await, Decimal::from(3000));
    let record = h.record("TXN-ROLL-2").await;
    assert_eq!(record.state, TransferState::Processing);
    assert!(!record.state.is_terminal());
    assert!(h.audit.failures().await.is_empty());
}

// ============================================================================
// Failure path
// ============================================================================

#[tokio::test]
async fn test_infrastructure_fault_fails_record() {
    let h = TestHarness::new(5000, 1000).await;
    h.accounts.set_fail_locks(true);

    let err = h
        .process(internal("TXN-LOCK-1", (ALICE, "A-100"), (BOB, "A-200"), 2000))
        .await
        .unwrap_err();

    match err {
        TransferError::TransactionFailed {
            transaction_id,
            code,
            ..
        } => {
            assert_eq!(transaction_id, "TXN-LOCK-1");
            assert_eq!(code, "DATABASE_ERROR");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // never left PENDING or PROCESSING
    let record = h.record("TXN-LOCK-1").await;
    assert_eq!(record.state, TransferState::Failed);
    assert_eq!(h.balance("A-100").await, Decimal::from(5000));
    assert_eq!(h.audit.failures().await.len(), 1);
}

#[tokio::test]
async fn test_secondary_error_is_suppressed() {
    let h = TestHarness::new(5000, 1000).await;
    h.accounts.set_fail_locks(true);
    h.audit.set_fail(true);

    let err = h
        .process(internal("TXN-SUP-1", (ALICE, "A-100"), (BOB, "A-200"), 2000))
        .await
        .unwrap_err();

    // the caller sees the original fault, not the audit failure
    assert!(matches!(
        err,
        TransferError::TransactionFailed { code: "DATABASE_ERROR", .. }
    ));
    assert_eq!(h.record("TXN-SUP-1").await.state, TransferState::Failed);
}

#[tokio::test]
async fn test_duplicate_transaction_id_keeps_first_record() {
    let h = TestHarness::new(5000, 1000).await;
    let command = internal("TXN-DUP-1", (ALICE, "A-100"), (BOB, "A-200"), 1000);

    assert!(h.process(command.clone()).await.unwrap().is_success());
    let err = h.process(command).await.unwrap_err();

    assert!(matches!(
        err,
        TransferError::TransactionFailed { code: "DUPLICATE_TRANSACTION", .. }
    ));
    assert_eq!(h.record("TXN-DUP-1").await.state, TransferState::Completed);
    assert_eq!(h.balance("A-100").await, Decimal::from(4000));
    assert!(h.audit.failures().await.is_empty());
}

// ============================================================================
// External transfers
// ============================================================================

#[tokio::test]
async fn test_external_success_debits_sender() {
    let h = TestHarness::new(500_000, 0).await;
    h.gateway
        .push_response(BankingResponse::success("BANK-77"))
        .await;

    let result = h.process(external("TXN-EXT-1", 100_000)).await.unwrap();

    assert!(result.is_success());
    assert_eq!(result.bank_transaction_id(), Some("BANK-77"));
    assert_eq!(h.balance("A-100").await, Decimal::from(400_000));

    let record = h.record("TXN-EXT-1").await;
    assert_eq!(record.state, TransferState::Completed);
    assert_eq!(record.kind, TransferKind::External);
    assert_eq!(record.receiver_id, None);
    assert_eq!(record.receiver_bank_code.as_deref(), Some("088"));
    assert_eq!(record.bank_transaction_id.as_deref(), Some("BANK-77"));

    let requests = h.gateway.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].sender_bank_code, "EASYPAY");
    assert_eq!(requests[0].currency, "KRW");
    assert_eq!(h.notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn test_external_error_fails_without_debit() {
    let h = TestHarness::new(500_000, 0).await;
    h.gateway
        .push_response(BankingResponse::error("INSUFFICIENT_FUNDS_AT_BANK"))
        .await;

    let result = h.process(external("TXN-EXT-2", 100_000)).await.unwrap();

    assert!(result.is_failure());
    assert_eq!(result.code(), codes::EXTERNAL_API_ERROR);
    assert!(result.message().contains("INSUFFICIENT_FUNDS_AT_BANK"));
    assert_eq!(h.balance("A-100").await, Decimal::from(500_000));
    assert_eq!(h.record("TXN-EXT-2").await.state, TransferState::Failed);
    assert!(h.notifier.sent().await.is_empty());

    let failures = h.audit.failures().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].event_type, AuditEventType::TransferFailed);
}

#[tokio::test]
async fn test_gateway_transport_error() {
    let h = TestHarness::new(500_000, 0).await;
    h.gateway.push_transport_error("connection reset").await;

    let result = h.process(external("TXN-EXT-3", 1000)).await.unwrap();

    assert!(result.is_failure());
    assert_eq!(result.code(), codes::EXTERNAL_TRANSFER_ERROR);
    assert_eq!(h.record("TXN-EXT-3").await.state, TransferState::Failed);
    assert_eq!(h.balance("A-100").await, Decimal::from(500_000));
}

#[tokio::test]
async fn test_external_timeout_then_late_success() {
    let h = TestHarness::new(500_000, 0).await;
    h.gateway
        .push_response(BankingResponse::timeout())
        .await;

    let result = h.process(external("TXN-EXT-4", 100_000)).await.unwrap();

    assert!(result.is_pending());
    assert!(result.is_timeout());
    assert_eq!(h.balance("A-100").await, Decimal::from(500_000));

    let record = h.record("TXN-EXT-4").await;
    assert_eq!(record.state, TransferState::Timeout);
    assert_eq!(record.reason.as_deref(), Some("gateway timed out"));
    let failures = h.audit.failures().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].event_type, AuditEventType::TransferTimeout);

    // the same report delivered twice settles once
    let tx = TransactionId::from("TXN-EXT-4");
    for _ in 0..2 {
        let record = h
            .service
            .apply_gateway_report(&tx, BankingResponse::success("BANK-LATE"))
            .await
            .unwrap();
        assert_eq!(record.state, TransferState::Completed);
        assert_eq!(record.bank_transaction_id.as_deref(), Some("BANK-LATE"));
    }

    assert_eq!(h.balance("A-100").await, Decimal::from(400_000));
    assert_eq!(h.ledger.entries_for(&tx).await.len(), 1);

    // the late settlement names the bank, not its code
    let successes = h.audit.successes().await;
    assert_eq!(successes.len(), 1);
    assert!(successes[0].description.contains("Partner bank:088-555-0101"));
    let sent = h.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message, "100000 sent to Partner bank 088-555-0101");
}

#[tokio::test]
async fn test_external_timeout_without_message() {
    let h = TestHarness::new(500_000, 0).await;
    h.gateway
        .push_response(BankingResponse {
            error_message: None,
            ..BankingResponse::timeout()
        })
        .await;

    let result = h.process(external("TXN-EXT-6", 1000)).await.unwrap();

    assert!(result.is_timeout());
    let record = h.record("TXN-EXT-6").await;
    assert_eq!(record.state, TransferState::Timeout);
    assert_eq!(record.reason.as_deref(), Some("Waiting for the partner bank"));
    assert_eq!(record.receiver_bank_name.as_deref(), Some("Partner bank"));
}

#[tokio::test]
async fn test_external_rejects_foreign_sender_account() {
    let h = TestHarness::new(500_000, 0).await;
    let mut command = external("TXN-EXT-7", 1000);
    if let TransferCommand::External(cmd) = &mut command {
        cmd.sender_id = BOB;
    }

    let result = h.process(command).await.unwrap();

    assert_eq!(result.code(), "NOT_ACCOUNT_OWNER");
    assert!(h.store.is_empty());
    assert_eq!(h.gateway.call_count(), 0);
    assert_eq!(h.ledger.open_units().await, 0);
}

#[tokio::test]
async fn test_external_pending_then_late_error() {
    let h = TestHarness::new(500_000, 0).await;
    h.gateway.push_response(BankingResponse::pending()).await;

    let result = h.process(external("TXN-EXT-5", 1000)).await.unwrap();
    assert!(result.is_pending());
    assert!(!result.is_timeout());
    assert_eq!(h.record("TXN-EXT-5").await.state, TransferState::Pending);

    let record = h
        .service
        .apply_gateway_report(&"TXN-EXT-5".into(), BankingResponse::error("ACCOUNT_CLOSED"))
        .await
        .unwrap();
    assert_eq!(record.state, TransferState::Failed);
    assert_eq!(h.balance("A-100").await, Decimal::from(500_000));
}

#[tokio::test]
async fn test_gateway_report_rejected_for_internal_transfer() {
    let h = TestHarness::new(5000, 1000).await;
    h.process(internal("TXN-INT-9", (ALICE, "A-100"), (BOB, "A-200"), 10))
        .await
        .unwrap();

    let err = h
        .service
        .apply_gateway_report(&"TXN-INT-9".into(), BankingResponse::success("X"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::MalformedCommand(_)));

    let err = h
        .service
        .apply_gateway_report(&"TXN-NOPE".into(), BankingResponse::success("X"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::TransferNotFound(_)));
}

// ============================================================================
// Secure transfers
// ============================================================================

#[tokio::test]
async fn test_secure_internal_transfer() {
    let h = TestHarness::new(5000, 1000).await;
    h.pins.issue("pin-ok", PIN_SCOPE_TRANSFER);

    let result = h.process(secure("TXN-SEC-1", "pin-ok", false, 2000)).await.unwrap();

    assert!(result.is_success());
    assert_eq!(h.balance("A-200").await, Decimal::from(3000));
    assert_eq!(h.record("TXN-SEC-1").await.kind, TransferKind::Internal);
}

#[tokio::test]
async fn test_secure_rejects_missing_or_invalid_pin() {
    let h = TestHarness::new(5000, 1000).await;

    let missing = h.process(secure("TXN-SEC-2", "  ", false, 10)).await.unwrap();
    assert_eq!(missing.code(), "PIN_SESSION_REQUIRED");

    let invalid = h.process(secure("TXN-SEC-3", "forged", false, 10)).await.unwrap();
    assert_eq!(invalid.code(), "PIN_SESSION_INVALID");

    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_secure_delegates_destination_checks() {
    let h = TestHarness::new(5000, 1000).await;
    h.pins.issue("pin-ok", PIN_SCOPE_TRANSFER);

    let result = h.process(secure("TXN-SEC-4", "pin-ok", false, 9000)).await.unwrap();
    assert_eq!(result.code(), "INSUFFICIENT_FUNDS");
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_secure_pin_expiring_before_execute() {
    let h = TestHarness::new(5000, 1000).await;
    h.pins.issue_limited("pin-once", PIN_SCOPE_TRANSFER, 1);

    let result = h
        .process(secure("TXN-SEC-5", "pin-once", false, 2000))
        .await
        .unwrap();

    assert!(result.is_failure());
    assert_eq!(result.code(), codes::PIN_SESSION_EXPIRED);
    assert_eq!(h.balance("A-100").await, Decimal::from(5000));
    assert_eq!(h.balance("A-200").await, Decimal::from(1000));
    assert_eq!(h.record("TXN-SEC-5").await.state, TransferState::Failed);
    assert!(h.ledger.journal().await.is_empty());
}

#[tokio::test]
async fn test_secure_external_uses_default_bank_name() {
    let h = TestHarness::new(500_000, 0).await;
    h.pins.issue("pin-ok", PIN_SCOPE_TRANSFER);
    h.gateway
        .push_response(BankingResponse::success("BANK-SEC"))
        .await;

    let result = h
        .process(secure("TXN-SEC-6", "pin-ok", true, 50_000))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.payload()["receiver_bank"], "External bank");
    let record = h.record("TXN-SEC-6").await;
    assert_eq!(record.kind, TransferKind::External);
    assert_eq!(record.bank_transaction_id.as_deref(), Some("BANK-SEC"));
    assert_eq!(h.balance("A-100").await, Decimal::from(450_000));
}

// ============================================================================
// Service layer
// ============================================================================

#[tokio::test]
async fn test_service_uses_primary_account() {
    let h = TestHarness::new(5000, 1000).await;

    let record = h
        .service
        .transfer(
            ALICE_PHONE,
            TransferRequest {
                sender_account_number: None,
                receiver_account_number: "A-200".into(),
                amount: Decimal::from(2000),
                memo: "rent".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(record.sender_account_number, "A-100");
    assert_eq!(record.receiver_id, Some(BOB));
    assert_eq!(record.state, TransferState::Completed);
    assert!(record.transaction_id.as_str().starts_with("TXN"));

    let page = Page::default();
    assert_eq!(h.service.sent_transfers(ALICE, page).await.unwrap().len(), 1);
    assert_eq!(h.service.received_transfers(BOB, page).await.unwrap().len(), 1);
    assert!(h.service.received_transfers(ALICE, page).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_service_history_is_paged_newest_first() {
    let h = TestHarness::new(5000, 1000).await;
    for i in 1..=5 {
        h.process(internal(&format!("TXN-PAGE-{}", i), (ALICE, "A-100"), (BOB, "A-200"), 10))
            .await
            .unwrap();
    }
    h.process(internal("TXN-PAGE-6", (BOB, "A-200"), (ALICE, "A-300"), 10))
        .await
        .unwrap();

    let ids = |records: Vec<TransferRecord>| -> Vec<String> {
        records.into_iter().map(|r| r.transaction_id.to_string()).collect()
    };

    let first = h.service.history(ALICE, Page::first(2)).await.unwrap();
    assert_eq!(ids(first), vec!["TXN-PAGE-6", "TXN-PAGE-5"]);

    let sent = h.service.sent_transfers(ALICE, Page::nth(1, 2)).await.unwrap();
    assert_eq!(ids(sent), vec!["TXN-PAGE-3", "TXN-PAGE-2"]);

    let last = h.service.sent_transfers(ALICE, Page::nth(2, 2)).await.unwrap();
    assert_eq!(ids(last), vec!["TXN-PAGE-1"]);

    let received = h.service.received_transfers(ALICE, Page::default()).await.unwrap();
    assert_eq!(ids(received), vec!["TXN-PAGE-6"]);
}

#[tokio::test]
async fn test_recent_transfers_lists_each_receiver_once() {
    let h = TestHarness::new(5000, 1000).await;
    h.accounts.add_user(User {
        id: 3,
        handle: "010-1000-0003".into(),
    });
    h.accounts.add_account(Account {
        id: 400,
        account_number: "A-400".into(),
        user_id: 3,
    });
    h.ledger.set_balance("A-400", Decimal::ZERO).await;

    h.process(internal("TXN-RCV-1", (ALICE, "A-100"), (BOB, "A-200"), 10))
        .await
        .unwrap();
    h.process(internal("TXN-RCV-2", (ALICE, "A-100"), (3, "A-400"), 10))
        .await
        .unwrap();
    h.process(internal("TXN-RCV-3", (ALICE, "A-100"), (BOB, "A-200"), 20))
        .await
        .unwrap();
    // failed transfers are not recent receivers
    h.gateway.push_response(BankingResponse::error("CLOSED")).await;
    h.process(external("TXN-RCV-4", 10)).await.unwrap();
    // neither is anything Alice received
    h.process(internal("TXN-RCV-5", (BOB, "A-200"), (ALICE, "A-300"), 5))
        .await
        .unwrap();

    let recent = h.service.recent_transfers(ALICE, Page::default()).await.unwrap();
    let seen: Vec<(&str, &str)> = recent
        .iter()
        .map(|r| (r.transaction_id.as_str(), r.receiver_account_number.as_str()))
        .collect();
    assert_eq!(seen, vec![("TXN-RCV-3", "A-200"), ("TXN-RCV-2", "A-400")]);

    let first = h.service.recent_transfers(ALICE, Page::first(1)).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].receiver_account_number, "A-200");
}

#[tokio::test]
async fn test_service_surfaces_failure_as_error() {
    let h = TestHarness::new(5000, 1000).await;

    let err = h
        .service
        .transfer(
            ALICE_PHONE,
            TransferRequest {
                sender_account_number: Some("A-100".into()),
                receiver_account_number: "A-200".into(),
                amount: Decimal::from(9000),
                memo: String::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::TransactionFailed { code: "INSUFFICIENT_FUNDS", .. }
    ));

    // sender may not pick someone else's account
    let err = h
        .service
        .transfer(
            ALICE_PHONE,
            TransferRequest {
                sender_account_number: Some("A-200".into()),
                receiver_account_number: "A-300".into(),
                amount: Decimal::from(1),
                memo: String::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::AccountNotFound(_)));

    let err = h
        .service
        .secure_transfer(
            "010-9999-9999",
            SecureTransferRequest {
                sender_account_number: None,
                receiver_account_number: "A-200".into(),
                amount: Decimal::from(1),
                memo: String::new(),
                pin_session_token: "pin".into(),
                is_external: false,
                receiver_bank_code: None,
                receiver_bank_name: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::UnknownHandle(_)));
}
