use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};

use super::*;
use crate::api::mock::MockApi;
use crate::api::{ServerError, WithdrawalMethod};
use crate::domain::{ConversionStage, UserSnapshot};
use crate::market::WalletStore;
use crate::notification::{ChannelNotifier, Event, EventData, EventFilter, ToastLevel};

fn user(value: Value) -> UserSnapshot {
    serde_json::from_value(value).unwrap()
}

fn base_user() -> Value {
    json!({
        "id": 7,
        "name": "Ada",
        "wallets": [
            {"id": 1, "name": "Bitcoin", "symbol": "BTC", "balance": "2.5"},
            {"id": 2, "name": "Ethereum", "symbol": "ETH", "balance": "0"},
            {"id": 3, "name": "US Dollar", "symbol": "USD", "balance": 1000}
        ]
    })
}

fn with_field(mut base: Value, key: &str, value: Value) -> Value {
    base[key] = value;
    base
}

struct Harness {
    api: Arc<MockApi>,
    session: Arc<SessionStore>,
    events: mpsc::UnboundedReceiver<Event>,
    notifier: Arc<ChannelNotifier>,
}

impl Harness {
    async fn new(snapshot: Value) -> Self {
        let api = Arc::new(MockApi::with_user(user(snapshot)));
        let session = Arc::new(SessionStore::new(api.clone(), Arc::new(WalletStore::new())));
        assert!(session.refresh().await.unwrap());
        api.calls.lock().unwrap().clear();
        let (notifier, events) = ChannelNotifier::new(EventFilter::all());
        Self {
            api,
            session,
            events,
            notifier: Arc::new(notifier),
        }
    }

    fn conversion(&self) -> ConversionFlow {
        ConversionFlow::new(self.session.clone(), self.notifier.clone())
    }

    fn withdrawal(&self) -> WithdrawalFlow {
        WithdrawalFlow::new(self.session.clone(), self.notifier.clone())
    }

    fn toasts(&mut self) -> Vec<(ToastLevel, String)> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let EventData::Toast(toast) = event.data {
                out.push((toast.level, toast.message));
            }
        }
        out
    }
}

fn conversion_request(id: u32, step: u32) -> Value {
    json!({"id": id, "from_wallet_id": 1, "to_wallet_id": 3, "status": "pending", "step": step})
}

fn withdrawal_request(stage: &str, code_length: u32) -> Value {
    json!({
        "id": 9,
        "wallet_id": 1,
        "status": "pending",
        "stage": stage,
        "code_length": code_length
    })
}

// -- session --

#[tokio::test]
async fn test_refresh_installs_snapshot_and_wallets() {
    let h = Harness::new(base_user()).await;
    assert_eq!(h.session.user_id().as_deref(), Some("7"));
    assert_eq!(h.session.wallets().wallets().len(), 3);
    assert_eq!(h.session.refreshes(), 1);
}

#[tokio::test]
async fn test_deactivated_session_drops_results() {
    let h = Harness::new(base_user()).await;
    h.session.deactivate();
    assert!(h.session.snapshot().wallets.is_empty());

    assert!(!h.session.refresh().await.unwrap());
    assert!(h.session.snapshot().wallets.is_empty());
    assert_eq!(h.api.calls(), vec!["get_user".to_string()]);

    h.session.activate();
    assert!(h.session.refresh().await.unwrap());
    assert_eq!(h.session.snapshot().wallets.len(), 3);
}

// -- conversion --

#[tokio::test]
async fn test_conversion_validation_makes_no_call() {
    let h = Harness::new(base_user()).await;
    let flow = h.conversion();

    let err = flow.submit("404", Some("3")).await.unwrap_err();
    assert!(matches!(err, FlowError::Validation(ValidationError::UnknownWallet)));

    let err = flow.submit("2", Some("3")).await.unwrap_err();
    assert!(matches!(err, FlowError::Validation(ValidationError::InsufficientBalance)));

    let err = flow.submit("1", Some("  ")).await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::Validation(ValidationError::MissingField("destination"))
    ));
    let err = flow.submit("1", None).await.unwrap_err();
    assert!(matches!(err, FlowError::Validation(_)));

    assert!(h.api.calls().is_empty());
    assert!(!flow.is_pending());
}

#[tokio::test]
async fn test_conversion_submit_refetches_and_toasts() {
    let mut h = Harness::new(base_user()).await;
    *h.api.message.lock().unwrap() = Some("Conversion request created".into());
    *h.api.after_mutation.lock().unwrap() = Some(user(with_field(
        base_user(),
        "conversion_requests",
        json!([conversion_request(11, 1)]),
    )));
    let flow = h.conversion();
    assert_eq!(flow.stage(), ConversionStage::None);

    let outcome = flow.submit("1", Some("3")).await.unwrap();
    assert_eq!(outcome.message.as_deref(), Some("Conversion request created"));
    assert!(outcome.refreshed);
    assert_eq!(
        h.api.calls(),
        vec!["create_conversion 1 3".to_string(), "get_user".to_string()]
    );
    assert!(matches!(flow.stage(), ConversionStage::AmountEntry(ref r) if r.id == "11"));
    assert!(matches!(flow.stage_for("1"), ConversionStage::AmountEntry(_)));
    assert_eq!(flow.stage_for("3"), ConversionStage::None);
    assert_eq!(
        h.toasts(),
        vec![(ToastLevel::Success, "Conversion request created".to_string())]
    );
}

#[tokio::test]
async fn test_conversion_highest_step_is_active() {
    let h = Harness::new(with_field(
        base_user(),
        "conversion_requests",
        json!([conversion_request(1, 1), conversion_request(2, 2)]),
    ))
    .await;
    let flow = h.conversion();
    assert!(matches!(flow.stage(), ConversionStage::FeePayment(ref r) if r.id == "2"));
}

#[tokio::test]
async fn test_fee_amount_requires_positive_number() {
    let h = Harness::new(with_field(
        base_user(),
        "conversion_requests",
        json!([conversion_request(11, 1)]),
    ))
    .await;
    let flow = h.conversion();

    for bad in ["", "abc", "0", "-5"] {
        let err = flow.submit_fee_amount(bad).await.unwrap_err();
        assert!(
            matches!(err, FlowError::Validation(ValidationError::InvalidAmount)),
            "{bad:?} accepted"
        );
    }
    assert!(h.api.calls().is_empty());

    flow.submit_fee_amount(" 25.5 ").await.unwrap();
    let mutations = h.api.mutations();
    assert_eq!(mutations.len(), 1);
    assert!(mutations[0].starts_with("update_conversion 11 "));
    assert!(mutations[0].contains("25.5"));
}

#[tokio::test]
async fn test_payment_requires_confirmation_and_stage() {
    let h = Harness::new(with_field(
        base_user(),
        "conversion_requests",
        json!([conversion_request(11, 2)]),
    ))
    .await;
    let flow = h.conversion();

    let err = flow.submit_fee_amount("10").await.unwrap_err();
    assert!(matches!(err, FlowError::InvalidState(_)));
    let err = flow.confirm_payment(false).await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::Validation(ValidationError::ConfirmationRequired)
    ));
    assert!(h.api.calls().is_empty());

    flow.confirm_payment(true).await.unwrap();
    assert_eq!(
        h.api.mutations(),
        vec![r#"update_conversion 11 {"confirmed_payment":true}"#.to_string()]
    );
}

#[tokio::test]
async fn test_cancel_without_request() {
    let h = Harness::new(base_user()).await;
    let err = h.conversion().cancel(true).await.unwrap_err();
    assert!(matches!(err, FlowError::NoActiveRequest("conversion")));
}

#[tokio::test]
async fn test_server_error_keeps_prior_state() {
    let mut h = Harness::new(with_field(
        base_user(),
        "conversion_requests",
        json!([conversion_request(11, 1)]),
    ))
    .await;
    h.api.fail_next(
        ServerError::new(422, "The given data was invalid.")
            .with_description("Amount is below the minimum fee")
            .with_field("amount", "The amount must be at least 10."),
    );
    let flow = h.conversion();
    let before = flow.stage();

    let err = flow.submit_fee_amount("1").await.unwrap_err();
    let fields = err.field_errors();
    assert_eq!(
        fields.get(FieldSlot::Amount),
        ["The amount must be at least 10.".to_string()]
    );
    assert_eq!(err.description(), Some("Amount is below the minimum fee"));
    assert_eq!(flow.stage(), before);
    assert!(!h.api.calls().contains(&"get_user".to_string()));
    // The field absorbed the error, so no toast.
    assert!(h.toasts().is_empty());
    assert!(!flow.is_pending());
}

#[tokio::test]
async fn test_unmapped_server_error_is_toasted() {
    let mut h = Harness::new(base_user()).await;
    h.api.fail_next(ServerError::new(500, "Server Error"));
    let err = h.conversion().submit("1", Some("3")).await.unwrap_err();
    assert!(matches!(err, FlowError::Server(_)));
    let toasts = h.toasts();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].0, ToastLevel::Error);
}

#[tokio::test]
async fn test_refetch_failure_still_succeeds() {
    let h = Harness::new(base_user()).await;
    h.api.user_failures.store(1, Ordering::SeqCst);
    let outcome = h.conversion().submit("1", Some("3")).await.unwrap();
    assert!(!outcome.refreshed);
}

#[tokio::test]
async fn test_second_mutation_while_pending_is_busy() {
    let h = Harness::new(base_user()).await;
    let gate = Arc::new(Notify::new());
    *h.api.gate.lock().unwrap() = Some(gate.clone());
    let flow = Arc::new(h.conversion());

    let first = tokio::spawn({
        let flow = flow.clone();
        async move { flow.submit("1", Some("3")).await }
    });
    tokio::time::timeout(Duration::from_secs(1), async {
        while !flow.is_pending() || h.api.mutations().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let err = flow.submit("1", Some("3")).await.unwrap_err();
    assert!(matches!(err, FlowError::Busy));
    assert_eq!(h.api.mutations().len(), 1);

    gate.notify_one();
    first.await.unwrap().unwrap();
    assert!(!flow.is_pending());
}

// -- withdrawal --

#[tokio::test]
async fn test_withdrawal_draft_navigation() {
    let h = Harness::new(base_user()).await;
    let flow = h.withdrawal();
    assert_eq!(flow.view(), WithdrawalView::None);

    assert!(matches!(
        flow.select_method(MethodKind::Crypto),
        Err(FlowError::InvalidState(_))
    ));
    flow.begin("1").unwrap();
    assert_eq!(
        flow.view(),
        WithdrawalView::MethodSelection { wallet_id: "1".into() }
    );
    flow.select_method(MethodKind::Bank).unwrap();
    assert_eq!(
        flow.view(),
        WithdrawalView::DetailEntry {
            wallet_id: "1".into(),
            method: MethodKind::Bank
        }
    );
    flow.back();
    assert!(matches!(flow.view(), WithdrawalView::MethodSelection { .. }));
    flow.back();
    assert_eq!(flow.view(), WithdrawalView::None);
}

#[tokio::test]
async fn test_withdrawal_details_validation() {
    let h = Harness::new(base_user()).await;
    let flow = h.withdrawal();
    flow.begin("1").unwrap();
    flow.select_method(MethodKind::Crypto).unwrap();

    let crypto = |address: &str| WithdrawalMethod::Crypto {
        address: address.into(),
        network: None,
    };
    let err = flow.submit_details(crypto(" "), "1").await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::Validation(ValidationError::MissingField("address"))
    ));
    let err = flow.submit_details(crypto("bc1qxyz"), "3").await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::Validation(ValidationError::AmountExceedsBalance)
    ));
    let err = flow.submit_details(crypto("bc1qxyz"), "zero").await.unwrap_err();
    assert!(matches!(err, FlowError::Validation(ValidationError::InvalidAmount)));

    let bank = WithdrawalMethod::Bank {
        bank_name: "First Bank".into(),
        account_name: "Ada".into(),
        account_number: "123".into(),
        routing_number: None,
        swift_code: None,
    };
    let err = flow.submit_details(bank, "1").await.unwrap_err();
    assert!(matches!(err, FlowError::InvalidState(_)));
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn test_withdrawal_created_enters_stage_loop() {
    let h = Harness::new(base_user()).await;
    *h.api.after_mutation.lock().unwrap() = Some(user(with_field(
        base_user(),
        "withdrawal_requests",
        json!([withdrawal_request("tax_clearance", 0)]),
    )));
    let flow = h.withdrawal();
    flow.begin("1").unwrap();
    flow.select_method(MethodKind::Crypto).unwrap();

    let method = WithdrawalMethod::Crypto {
        address: "bc1qxyz".into(),
        network: Some("bitcoin".into()),
    };
    flow.submit_details(method, "2.5").await.unwrap();

    let mutations = h.api.mutations();
    assert_eq!(mutations.len(), 1);
    assert!(mutations[0].contains(r#""method":"crypto""#));
    assert!(mutations[0].contains(r#""wallet_id":"1""#));

    match flow.view() {
        WithdrawalView::StageLoop { request, prompt } => {
            assert_eq!(request.id, "9");
            assert_eq!(prompt.code_length, 6);
            assert_eq!(prompt.percent, 15);
        }
        other => panic!("unexpected view {other:?}"),
    }
    assert!(flow.active_for("1").is_some());
    assert!(flow.active_for("3").is_none());
    assert!(matches!(flow.begin("3"), Err(FlowError::InvalidState(_))));
}

#[tokio::test]
async fn test_code_length_gate() {
    for (stage, len) in [
        ("entity_pin", 4usize),
        ("tax_clearance", 6),
        ("fscs_code", 7),
        ("etf_code", 8),
    ] {
        let h = Harness::new(with_field(
            base_user(),
            "withdrawal_requests",
            json!([withdrawal_request(stage, 0)]),
        ))
        .await;
        let flow = h.withdrawal();

        for wrong in [len - 1, len + 1] {
            let err = flow.submit_code(&"1".repeat(wrong)).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    FlowError::Validation(ValidationError::CodeLength { expected, .. })
                        if expected as usize == len
                ),
                "{stage}: {wrong} chars accepted"
            );
        }
        assert!(h.api.calls().is_empty());

        flow.submit_code(&"1".repeat(len)).await.unwrap();
        assert_eq!(
            h.api.mutations(),
            vec![format!("update_withdrawal_stage 9 {} {}", stage, "1".repeat(len))]
        );
    }
}

#[tokio::test]
async fn test_code_length_counts_padding() {
    let h = Harness::new(with_field(
        base_user(),
        "withdrawal_requests",
        json!([withdrawal_request("entity_pin", 0)]),
    ))
    .await;
    let flow = h.withdrawal();

    for padded in ["1234 ", " 1234", "12 34"] {
        let err = flow.submit_code(padded).await.unwrap_err();
        assert!(
            matches!(
                err,
                FlowError::Validation(ValidationError::CodeLength { expected: 4, actual: 5 })
            ),
            "{padded:?} accepted"
        );
    }
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn test_server_code_length_overrides_default() {
    let h = Harness::new(with_field(
        base_user(),
        "withdrawal_requests",
        json!([withdrawal_request("entity_pin", 5)]),
    ))
    .await;
    let flow = h.withdrawal();
    assert!(flow.submit_code("1234").await.is_err());
    assert!(flow.submit_code("12345").await.is_ok());
}

#[tokio::test]
async fn test_zero_code_length_falls_back_to_stage_default() {
    let h = Harness::new(with_field(
        base_user(),
        "withdrawal_requests",
        json!([withdrawal_request("entity_pin", 0)]),
    ))
    .await;
    match h.withdrawal().view() {
        WithdrawalView::StageLoop { prompt, .. } => assert_eq!(prompt.code_length, 4),
        other => panic!("unexpected view {other:?}"),
    }
}

#[tokio::test]
async fn test_terminal_stage_result_shows_status() {
    let h = Harness::new(with_field(
        base_user(),
        "withdrawal_requests",
        json!([withdrawal_request("fund_transfer_pin", 0)]),
    ))
    .await;
    *h.api.stage_result.lock().unwrap() = Some(
        serde_json::from_value(json!({
            "id": 9,
            "wallet_id": 1,
            "status": "completed",
            "message": "Funds are on their way"
        }))
        .unwrap(),
    );
    *h.api.after_mutation.lock().unwrap() = Some(user(with_field(
        base_user(),
        "withdrawal_requests",
        json!([{"id": 9, "wallet_id": 1, "status": "completed"}]),
    )));
    let flow = h.withdrawal();

    flow.submit_code("123456").await.unwrap();
    assert_eq!(
        flow.view(),
        WithdrawalView::Status(StatusView {
            outcome: StatusOutcome::Success,
            message: "Funds are on their way".into(),
            request_id: Some("9".into()),
        })
    );
    flow.dismiss_status();
    assert_eq!(flow.view(), WithdrawalView::None);
}

#[tokio::test]
async fn test_stageless_request_shows_pending_status() {
    let h = Harness::new(with_field(
        base_user(),
        "withdrawal_requests",
        json!([{"id": 9, "wallet_id": 1, "status": "processing"}]),
    ))
    .await;
    match h.withdrawal().view() {
        WithdrawalView::Status(status) => assert_eq!(status.outcome, StatusOutcome::Pending),
        other => panic!("unexpected view {other:?}"),
    }
}

#[tokio::test]
async fn test_withdrawal_cancel() {
    let h = Harness::new(with_field(
        base_user(),
        "withdrawal_requests",
        json!([withdrawal_request("etf_code", 0)]),
    ))
    .await;
    let flow = h.withdrawal();

    let err = flow.cancel(false).await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::Validation(ValidationError::ConfirmationRequired)
    ));
    assert!(h.api.calls().is_empty());

    flow.cancel(true).await.unwrap();
    assert_eq!(h.api.mutations(), vec!["cancel_withdrawal 9".to_string()]);
}

#[tokio::test]
async fn test_cancel_local_draft() {
    let h = Harness::new(base_user()).await;
    let flow = h.withdrawal();
    assert!(matches!(
        flow.cancel(true).await,
        Err(FlowError::NoActiveRequest("withdrawal"))
    ));
    flow.begin("1").unwrap();
    flow.cancel(false).await.unwrap();
    assert_eq!(flow.view(), WithdrawalView::None);
    assert!(h.api.calls().is_empty());
}
