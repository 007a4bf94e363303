//! End-to-end journey tests against the scriptable fake page.
//!
//! These exercise the whole stack the way a real suite would: page
//! models, resolver fallbacks, condition waits, two-phase actions, and
//! flow remediation, all under paused time so every retry path is
//! deterministic.

use std::sync::Arc;
use std::time::Duration;

use tenaz::fake::{FakeNode, FakePage};
use tenaz::{
    open_page, AuthState, Cookie, Flow, FlowSequencer, Intent, PageDriver, PageModelBuilder,
    RemediationRule, ResourceLedger, SequencerOptions, Strategy, TenazError, WaitOptions,
};

fn dashboard() -> Arc<FakePage> {
    Arc::new(
        FakePage::new()
            .with_node(FakeNode::new("combobox", "Chain").with_test_id("chain-picker"))
            .with_node(FakeNode::new("option", "Solana"))
            .with_node(
                FakeNode::new("button", "Launch agent").with_test_id("launch-agent"),
            ),
    )
}

fn with_error_modal(page: Arc<FakePage>) -> Arc<FakePage> {
    page.add_node(FakeNode::new("dialog", "Bot wallet error").with_css("error-modal"));
    page.add_node(FakeNode::new("button", "Dismiss").with_test_id("dismiss-error"));
    page
}

fn dashboard_model() -> Arc<tenaz::DeclaredPage> {
    Arc::new(
        PageModelBuilder::new("agent dashboard")
            .with_url_pattern("/agents")
            .with_intent(Intent::new("chain picker").by_test_id("chain-picker"))
            .with_intent(
                Intent::new("launch button")
                    .by_test_id("launch-agent")
                    .by_role("button", "Launch agent"),
            )
            .with_ready_intent("chain picker")
            .build(),
    )
}

fn launch_flow(page: Arc<FakePage>, remedy_restores_agent: bool) -> Flow {
    let model = dashboard_model();
    let chain_picker = Intent::new("chain picker").by_test_id("chain-picker");
    let solana = Intent::new("solana option").by_role("option", "Solana");
    let launch = Intent::new("launch button").by_test_id("launch-agent");
    let live = Strategy::ByStructure("agent-live".to_string());
    let dismiss = Intent::new("dismiss error").by_test_id("dismiss-error");

    let confirm_options = WaitOptions::new()
        .with_timeout(Duration::from_secs(3))
        .with_intervals(vec![Duration::from_secs(1)]);

    Flow::builder("launch agent")
        .step("open dashboard", {
            let model = Arc::clone(&model);
            move |cx| {
                let model = Arc::clone(&model);
                async move { open_page(&cx, model.as_ref(), "https://app.example/agents").await }
            }
        })
        .step("select chain", {
            let picker = chain_picker.clone();
            let option = solana.clone();
            move |cx| {
                let picker = picker.clone();
                let option = option.clone();
                async move {
                    cx.click(&picker).await?;
                    cx.click(&option).await?;
                    Ok(())
                }
            }
        })
        .step("launch agent", {
            let launch = launch.clone();
            move |cx| {
                let launch = launch.clone();
                async move {
                    cx.click(&launch).await?;
                    Ok(())
                }
            }
        })
        .step("confirm agent live", {
            let live = live.clone();
            let options = confirm_options.clone();
            move |cx| {
                let live = live.clone();
                let options = options.clone();
                async move { cx.waiter().wait_visible(&live, &options).await }
            }
        })
        .remediation(RemediationRule::new(
            "dismiss bot wallet error",
            |cx| async move {
                let modal = Strategy::ByStructure("error-modal".to_string());
                Ok(cx.resolver().count(&modal).await? > 0)
            },
            {
                let fix = Arc::clone(&page);
                let dismiss = dismiss.clone();
                move |cx| {
                    let fix = Arc::clone(&fix);
                    let dismiss = dismiss.clone();
                    async move {
                        cx.click(&dismiss).await?;
                        if remedy_restores_agent {
                            fix.remove_by_name("Bot wallet error");
                            fix.add_node(
                                FakeNode::new("status", "Agent live").with_css("agent-live"),
                            );
                        }
                        Ok(())
                    }
                }
            },
        ))
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_launch_journey_remediates_wallet_error_then_succeeds() {
    let page = with_error_modal(dashboard());
    let seq = FlowSequencer::with_options(
        Arc::clone(&page) as Arc<dyn PageDriver>,
        SequencerOptions::new().with_max_attempts(3),
    );

    let flow = launch_flow(Arc::clone(&page), true);
    let result = seq.run(&flow).await.unwrap();

    assert_eq!(result.attempt_count(), 2);
    assert_eq!(result.remediated_count(), 1);

    let clicks: Vec<String> = page.clicks().iter().map(|c| c.target.clone()).collect();
    let launches = clicks.iter().filter(|t| *t == "Launch agent").count();
    let dismissals = clicks.iter().filter(|t| *t == "Dismiss").count();
    assert_eq!(launches, 2, "launch runs once per attempt");
    assert_eq!(dismissals, 1, "remediation ran exactly once");
}

#[tokio::test(start_paused = true)]
async fn test_launch_journey_exhausts_budget_when_modal_keeps_returning() {
    let page = with_error_modal(dashboard());
    let seq = FlowSequencer::with_options(
        Arc::clone(&page) as Arc<dyn PageDriver>,
        SequencerOptions::new().with_max_attempts(3),
    );

    let flow = launch_flow(Arc::clone(&page), false);
    let err = seq.run(&flow).await.unwrap_err();

    match err {
        TenazError::RetryBudgetExceeded { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected RetryBudgetExceeded, got {other}"),
    }

    let dismissals = page
        .clicks()
        .iter()
        .filter(|c| c.target == "Dismiss")
        .count();
    assert_eq!(dismissals, 3, "one remediation per attempt, never a fourth");
    assert_eq!(seq.reports()[0].attempt_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_journey_reports_step_identity_and_screenshot() {
    // No error modal: the confirm step times out and nothing remediates.
    let page = dashboard();
    let seq = FlowSequencer::with_options(
        Arc::clone(&page) as Arc<dyn PageDriver>,
        SequencerOptions::new().with_max_attempts(3),
    );

    let flow = launch_flow(Arc::clone(&page), true);
    let err = seq.run(&flow).await.unwrap_err();

    match err {
        TenazError::FatalFlow {
            flow,
            step,
            description,
            attempt,
            ..
        } => {
            assert_eq!(flow, "launch agent");
            assert_eq!(step, 4);
            assert_eq!(description, "confirm agent live");
            assert_eq!(attempt, 1);
        }
        other => panic!("expected FatalFlow, got {other}"),
    }

    let record = &seq.reports()[0];
    assert!(record.failure_screenshot.is_some());
    let steps = &record.attempts[0].steps;
    assert_eq!(steps.len(), 4);
    assert_eq!(steps[3].number, 4);
}

#[tokio::test(start_paused = true)]
async fn test_report_archive_round_trips_through_json() {
    let page = with_error_modal(dashboard());
    let seq = FlowSequencer::new(Arc::clone(&page) as Arc<dyn PageDriver>);

    let flow = launch_flow(Arc::clone(&page), true);
    seq.run(&flow).await.unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("reports").join("journeys.json");
    seq.take_archive().save_json(&path).unwrap();

    let loaded = tenaz::FlowReportArchive::load_json(&path).unwrap();
    assert_eq!(loaded.records.len(), 1);
    assert!(loaded.records[0].succeeded());
    assert_eq!(loaded.records[0].remediated_count(), 1);
    assert!(loaded.failures().is_empty());

    // Drained: a second archive is empty.
    assert!(seq.take_archive().records.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_auth_precondition_applies_before_flow() {
    let dir = tempfile::TempDir::new().unwrap();
    let auth_path = dir.path().join("auth.json");
    let mut bundle = AuthState::new();
    bundle
        .cookies
        .push(Cookie::new("session", "tok_123", "app.example"));
    std::fs::write(&auth_path, serde_json::to_string(&bundle).unwrap()).unwrap();

    let page = dashboard();
    let loaded = AuthState::load_json(&auth_path).unwrap();
    page.apply_session(&loaded).await.unwrap();

    let applied = page.applied_session().expect("session applied");
    assert_eq!(applied.cookie("session").unwrap().value, "tok_123");
}

#[tokio::test(start_paused = true)]
async fn test_wallet_ledger_guards_flow_resources() {
    let dir = tempfile::TempDir::new().unwrap();
    let ledger = ResourceLedger::new(dir.path().join("used_wallets.json"));
    let candidates = vec!["0xWalletA".to_string(), "0xWalletB".to_string()];

    let wallet = ledger
        .claim_next_unused(&candidates)
        .unwrap()
        .expect("a wallet available");
    assert_eq!(wallet, "0xwalleta");

    // The flow itself is wallet-agnostic; what matters is the claim is
    // durable for the next worker.
    let page = dashboard();
    let seq = FlowSequencer::new(Arc::clone(&page) as Arc<dyn PageDriver>);
    let flow = Flow::builder("fund agent")
        .step("open dashboard", {
            let model = dashboard_model();
            move |cx| {
                let model = Arc::clone(&model);
                async move { open_page(&cx, model.as_ref(), "https://app.example/agents").await }
            }
        })
        .build();
    seq.run(&flow).await.unwrap();

    assert!(ledger.is_used(&wallet).unwrap());
    assert_eq!(
        ledger.claim_next_unused(&candidates).unwrap().as_deref(),
        Some("0xwalletb")
    );
}

#[tokio::test(start_paused = true)]
async fn test_selection_scenario_never_crosses_intents() {
    // 3 "Deselect agent" and 2 "Select agent" buttons; index 0 of the
    // select intent must be a Select element.
    let page = Arc::new(
        FakePage::new()
            .with_node(FakeNode::new("button", "Deselect agent"))
            .with_node(FakeNode::new("button", "Select agent"))
            .with_node(FakeNode::new("button", "Deselect agent"))
            .with_node(FakeNode::new("button", "Select agent"))
            .with_node(FakeNode::new("button", "Deselect agent")),
    );
    let seq = FlowSequencer::new(Arc::clone(&page) as Arc<dyn PageDriver>);
    let cx = seq.context();

    let select = Intent::new("select button").by_role("button", "Select agent");
    let outcome = cx.click_nth(&select, 0).await.unwrap();
    assert_eq!(outcome.target, "Select agent");
    assert_eq!(page.clicks()[0].target, "Select agent");
}
