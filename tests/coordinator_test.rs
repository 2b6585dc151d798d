//! Coordinator-level behavior: config lookup, pooling, deadlines, cancellation

mod common;

use common::{document, fast_config, harness, request};
use sheetquote::model::ExecutionOutcome;
use sheetquote::session::mock::{MockElement, MockPage};
use sheetquote::ErrorKind;

#[tokio::test]
async fn unknown_domain_fails_without_a_session() {
    let page = MockPage::new();
    let (coordinator, factory) = harness(
        fast_config(),
        page,
        document(&[(
            "square_meter_price",
            r#"[{"type": "read_price", "selector": ".price"}]"#,
        )]),
    );

    let mut req = request();
    req.url = "https://unconfigured.org/sheet".to_string();

    match coordinator.calculate(req).await {
        ExecutionOutcome::Failed { kind, .. } => assert_eq!(kind, ErrorKind::ConfigInvalid),
        other => panic!("expected failure, got {:?}", other),
    }
    // The config miss must short-circuit before any browser work.
    assert_eq!(factory.opened(), 0);
}

#[tokio::test]
async fn unknown_category_fails() {
    let page = MockPage::new();
    page.set_text(".price", "10,00");
    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[(
            "square_meter_price",
            r#"[{"type": "read_price", "selector": ".price"}]"#,
        )]),
    );

    let mut req = request();
    req.category = "shipping".to_string();

    match coordinator.calculate(req).await {
        ExecutionOutcome::Failed { kind, .. } => assert_eq!(kind, ErrorKind::ConfigInvalid),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_country_fails_at_the_price_step() {
    let page = MockPage::new();
    page.set_text(".price", "121.00");
    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[(
            "square_meter_price",
            r#"[{"type": "read_price", "selector": ".price", "includes_vat": true}]"#,
        )]),
    );

    let mut req = request();
    req.country = "zz".to_string();

    match coordinator.calculate(req).await {
        ExecutionOutcome::Failed {
            step_index, kind, ..
        } => {
            assert_eq!(step_index, 0);
            assert_eq!(kind, ErrorKind::ConfigInvalid);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn invalid_dimensions_are_rejected() {
    let page = MockPage::new();
    page.set_text(".price", "10,00");
    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[(
            "square_meter_price",
            r#"[{"type": "read_price", "selector": ".price"}]"#,
        )]),
    );

    let mut req = request();
    req.quantity = 0;

    match coordinator.calculate(req).await {
        ExecutionOutcome::Failed { kind, .. } => assert_eq!(kind, ErrorKind::ConfigInvalid),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn cancellation_aborts_at_a_suspension_point() {
    let page = MockPage::new();
    page.put("#button", MockElement::input());
    page.set_text(".price", "10,00");

    let mut config = fast_config();
    // A wait long enough that cancellation lands inside it.
    config.wait_longest_ms = 5000;

    let (coordinator, _) = harness(
        config,
        page,
        document(&[(
            "square_meter_price",
            r#"[
                {"type": "wait", "duration": "longest"},
                {"type": "read_price", "selector": ".price"}
            ]"#,
        )]),
    );

    let mut ticket = coordinator.submit(request());
    // Wait until the run is inside the first step, then cancel.
    let first = ticket.next_event().await.expect("run should start");
    assert_eq!(first.step_index, 0);
    ticket.cancel();

    while ticket.next_event().await.is_some() {}
    match ticket.outcome().await {
        ExecutionOutcome::Aborted { .. } => {}
        other => panic!("expected abort, got {:?}", other),
    }
}

#[tokio::test]
async fn overall_deadline_forces_teardown() {
    let page = MockPage::new();
    page.set_text(".price", "10,00");

    let mut config = fast_config();
    config.run_timeout_secs = 1;
    config.wait_longest_ms = 10_000;

    let (coordinator, _) = harness(
        config,
        page,
        document(&[(
            "square_meter_price",
            r#"[
                {"type": "wait", "duration": "longest"},
                {"type": "read_price", "selector": ".price"}
            ]"#,
        )]),
    );

    match coordinator.calculate(request()).await {
        ExecutionOutcome::Aborted { reason } => {
            assert!(reason.contains("deadline"), "reason: {}", reason);
        }
        other => panic!("expected abort, got {:?}", other),
    }
    // Forced teardown leaves no session behind.
    assert_eq!(coordinator.active_sessions(), 0);
}

#[tokio::test]
async fn bounded_pool_still_completes_all_runs() {
    let page = MockPage::new();
    page.set_text(".price", "121.00");

    let mut config = fast_config();
    config.max_concurrent_runs = 1;

    let (coordinator, _) = harness(
        config,
        page,
        document(&[(
            "square_meter_price",
            r#"[{"type": "read_price", "selector": ".price", "includes_vat": true}]"#,
        )]),
    );

    use futures_util::StreamExt;

    let tickets: Vec<_> = (0..3).map(|_| coordinator.submit(request())).collect();
    for mut ticket in tickets {
        let events: Vec<_> = ticket.events().collect().await;
        assert!(!events.is_empty());
        assert!(ticket.outcome().await.is_success());
    }
}
