//! End-to-end runs against the scriptable mock page

mod common;

use common::{document, fast_config, harness, request};
use sheetquote::model::ExecutionOutcome;
use sheetquote::runner::StepStatus;
use sheetquote::session::mock::{MockElement, MockPage};
use sheetquote::ErrorKind;

const STANDARD_STEPS: &str = r##"[
    {"type": "click", "selector": "#cookie-accept", "continue_on_error": true},
    {"type": "input", "selector": "#w", "value": "{width}", "unit": "mm"},
    {"type": "input", "selector": "#h", "value": "{length}", "unit": "mm"},
    {"type": "blur"},
    {"type": "wait", "duration": "default"},
    {"type": "read_price", "selector": ".price", "includes_vat": true}
]"##;

fn standard_page() -> std::sync::Arc<MockPage> {
    let page = MockPage::new();
    // No #cookie-accept on purpose: the tolerated click must not abort.
    page.put("#w", MockElement::input());
    page.put("#h", MockElement::input());
    page.set_text(".price", "121.00");
    page
}

#[tokio::test]
async fn standard_sequence_yields_net_price() {
    let page = standard_page();
    let (coordinator, _) = harness(
        fast_config(),
        page.clone(),
        document(&[("square_meter_price", STANDARD_STEPS)]),
    );

    let outcome = coordinator.calculate(request()).await;
    let price = outcome.price().expect("run should succeed");

    assert!((price.net - 100.0).abs() < 1e-6);
    assert_eq!(price.gross, 121.0);
    assert_eq!(price.currency, "EUR");
    assert!(price.includes_vat);

    // Dimensions landed in the form fields, in millimeters.
    assert_eq!(page.value_of("#w").unwrap(), "300");
    assert_eq!(page.value_of("#h").unwrap(), "500");
}

#[tokio::test]
async fn replaying_identical_run_is_deterministic() {
    let page = standard_page();
    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[("square_meter_price", STANDARD_STEPS)]),
    );

    let first = coordinator.calculate(request()).await;
    let second = coordinator.calculate(request()).await;

    assert_eq!(first.price(), second.price());
}

#[tokio::test]
async fn decide_config_switches_to_fallback() {
    let page = MockPage::new();
    // Probe selector absent; fallback category carries the price.
    page.set_text(".alt-price", "50,00");

    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[
            (
                "square_meter_price",
                r##"[{"type": "decide_config", "selector": "#calculator", "timeout": 1, "fallback_config": "square_meter_price_2"}]"##,
            ),
            (
                "square_meter_price_2",
                r#"[{"type": "read_price", "selector": ".alt-price"}]"#,
            ),
        ]),
    );

    let mut ticket = coordinator.submit(request());
    let mut saw_switch = false;
    while let Some(event) = ticket.next_event().await {
        if event.status == StepStatus::ConfigSwitched {
            saw_switch = true;
        }
    }
    let outcome = ticket.outcome().await;

    assert!(saw_switch, "expected a config switch event");
    let price = outcome.price().expect("fallback run should succeed");
    assert_eq!(price.amount, 50.0);
    assert_eq!(price.net, 50.0);
}

#[tokio::test]
async fn decide_config_keeps_current_when_probe_present() {
    let page = MockPage::new();
    page.put("#calculator", MockElement::input());
    page.set_text(".price", "10,00");
    page.set_text(".alt-price", "99,00");

    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[
            (
                "square_meter_price",
                r##"[
                    {"type": "decide_config", "selector": "#calculator", "timeout": 1, "fallback_config": "square_meter_price_2"},
                    {"type": "read_price", "selector": ".price"}
                ]"##,
            ),
            (
                "square_meter_price_2",
                r#"[{"type": "read_price", "selector": ".alt-price"}]"#,
            ),
        ]),
    );

    let outcome = coordinator.calculate(request()).await;
    assert_eq!(outcome.price().unwrap().amount, 10.0);
}

#[tokio::test]
async fn calculation_divides_price_by_quantity() {
    let page = MockPage::new();
    page.set_text(".total", "40,00");

    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[(
            "square_meter_price",
            r#"[{"type": "read_price", "selector": ".total", "calculation": "price / {quantity}"}]"#,
        )]),
    );

    let outcome = coordinator.calculate(request()).await;
    // 40 for four pieces: 10 per piece.
    assert_eq!(outcome.price().unwrap().amount, 10.0);
}

#[tokio::test]
async fn missing_selector_fails_with_step_index() {
    let page = MockPage::new();
    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[(
            "square_meter_price",
            r##"[{"type": "click", "selector": "#missing"}]"##,
        )]),
    );

    match coordinator.calculate(request()).await {
        ExecutionOutcome::Failed {
            step_index, kind, ..
        } => {
            assert_eq!(step_index, 0);
            assert_eq!(kind, ErrorKind::SelectorNotFound);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn tolerated_failure_does_not_abort() {
    let page = MockPage::new();
    page.set_text(".price", "121.00");

    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[(
            "square_meter_price",
            r##"[
                {"type": "click", "selector": "#missing", "continue_on_error": true},
                {"type": "read_price", "selector": ".price", "includes_vat": true}
            ]"##,
        )]),
    );

    let outcome = coordinator.calculate(request()).await;
    assert!(outcome.is_success());
}

#[tokio::test]
async fn session_recreated_exactly_at_threshold() {
    let page = MockPage::new();
    page.put("#target", MockElement::input());
    page.set_text(".price", "121.00");
    // Two crashes: the first degrades the session, the second kills it.
    page.crash_next(2);

    let (coordinator, factory) = harness(
        fast_config(),
        page,
        document(&[(
            "square_meter_price",
            r##"[
                {"type": "click", "selector": "#target"},
                {"type": "read_price", "selector": ".price", "includes_vat": true}
            ]"##,
        )]),
    );

    let outcome = coordinator.calculate(request()).await;
    assert!(outcome.is_success(), "run should recover: {:?}", outcome);
    // One recreation, exactly at the threshold of two consecutive failures.
    assert_eq!(factory.opened(), 2);
}

#[tokio::test]
async fn persistent_crashes_exhaust_retries() {
    let page = MockPage::new();
    page.put("#target", MockElement::input());
    page.set_text(".price", "121.00");
    page.crash_next(50);

    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[(
            "square_meter_price",
            r##"[
                {"type": "click", "selector": "#target"},
                {"type": "read_price", "selector": ".price", "includes_vat": true}
            ]"##,
        )]),
    );

    match coordinator.calculate(request()).await {
        ExecutionOutcome::Failed {
            step_index, kind, ..
        } => {
            assert_eq!(step_index, 0);
            assert_eq!(kind, ErrorKind::SessionCrashed);
        }
        other => panic!("expected session failure, got {:?}", other),
    }
}

#[tokio::test]
async fn transient_navigation_errors_are_retried() {
    let page = MockPage::new();
    page.set_text(".price", "121.00");
    // The landing navigation fails twice, then succeeds within the retry cap.
    page.fail_navigations(2);

    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[(
            "square_meter_price",
            r#"[{"type": "read_price", "selector": ".price", "includes_vat": true}]"#,
        )]),
    );

    let outcome = coordinator.calculate(request()).await;
    assert!(outcome.is_success(), "retries should absorb the flake");
}

#[tokio::test]
async fn config_without_price_step_fails() {
    let page = MockPage::new();
    page.put("#button", MockElement::input());

    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[(
            "square_meter_price",
            r##"[{"type": "click", "selector": "#button"}]"##,
        )]),
    );

    match coordinator.calculate(request()).await {
        ExecutionOutcome::Failed { kind, .. } => assert_eq!(kind, ErrorKind::ConfigInvalid),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn progress_events_are_ordered_and_monotonic() {
    let page = standard_page();
    let (coordinator, _) = harness(
        fast_config(),
        page,
        document(&[("square_meter_price", STANDARD_STEPS)]),
    );

    let mut ticket = coordinator.submit(request());
    let mut last_index = 0usize;
    let mut events = Vec::new();
    while let Some(event) = ticket.next_event().await {
        assert!(
            event.step_index >= last_index,
            "step index regressed: {} after {}",
            event.step_index,
            last_index
        );
        last_index = event.step_index;
        events.push(event);
    }

    assert!(ticket.outcome().await.is_success());
    assert_eq!(events.first().unwrap().status, StepStatus::Started);
    // The tolerated cookie click must surface as tolerated, not failed.
    assert!(events.iter().any(|e| e.status == StepStatus::Tolerated));
    assert!(!events.iter().any(|e| e.status == StepStatus::Failed));
}
