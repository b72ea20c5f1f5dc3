//! Scenario runner against the in-memory page

use std::time::Duration;

use pihr_common::{EventKind, SuiteConfig};
use pihr_e2e::{FakeElement, FakePage, Scenario, ScenarioRunner, TestContext, UiAction};

fn runner(page: &FakePage, out: &tempfile::TempDir) -> ScenarioRunner<FakePage> {
    let config = SuiteConfig {
        base_url: "https://pihr.test".to_string(),
        screenshot_dir: out.path().join("screenshots"),
        output_dir: out.path().to_path_buf(),
        ..Default::default()
    };
    ScenarioRunner::new(TestContext::new(config, page.clone()))
}

fn login_page() -> FakePage {
    let page = FakePage::new();
    page.add(r#"input[name="Username/ Mobile"]"#, FakeElement::visible());
    page.add(r#"input[name="Password"]"#, FakeElement::visible());
    page.add(
        r#"button[name="Login"]"#,
        FakeElement::visible().on_click_navigate("https://pihr.test/dashboard"),
    );
    page
}

const LOGIN: &str = r#"
name: login
steps:
  - action: navigate
    url: /login
  - action: branch
    selector: 'iframe[title="Login Page"]'
    timeout_ms: 2000
    present:
      - action: log
        message: iframe login is not scripted here
    absent:
      - action: fill
        selector: 'input[name="Username/ Mobile"]'
        value: '01830377213'
        description: username
      - action: fill
        selector: 'input[name="Password"]'
        value: secret
        description: password
  - action: click
    selector: 'button[name="Login"]'
    description: login button
    retry: false
  - action: assert_url
    contains: dashboard
"#;

#[tokio::test(start_paused = true)]
async fn login_takes_direct_path_when_iframe_absent() {
    let page = login_page();
    let out = tempfile::tempdir().unwrap();
    let runner = runner(&page, &out);

    let result = runner
        .run_scenario(&Scenario::from_yaml(LOGIN).unwrap())
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(page.navigations(), vec!["https://pihr.test/login"]);
    assert_eq!(page.value(r#"input[name="Password"]"#).as_deref(), Some("secret"));
    assert_eq!(page.clicks(r#"button[name="Login"]"#), 1);

    let names: Vec<_> = result.steps.iter().map(|s| s.step_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "navigate:/login",
            r#"branch:iframe[title="Login Page"]"#,
            "fill:username",
            "fill:password",
            "click:login button",
            "assert_url:dashboard",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn flaky_click_is_retried_under_the_suite_policy() {
    let page = FakePage::new();
    page.add("#menu", FakeElement::visible().failing_clicks(2));
    let out = tempfile::tempdir().unwrap();
    let runner = runner(&page, &out);

    let scenario = Scenario::from_yaml(
        "name: menu\nsteps:\n  - action: click\n    selector: '#menu'\n",
    )
    .unwrap();
    let result = runner.run_scenario(&scenario).await;

    assert!(result.success);
    assert_eq!(result.steps[0].attempts, 3);
    assert_eq!(page.clicks("#menu"), 1);
    assert_eq!(runner.context().events().by_component("retry").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_click_fails_once_and_collects_diagnostics() {
    let page = FakePage::new();
    page.set_title("Leave Application");
    page.add("#submit", FakeElement::visible().failing_clicks(1));
    page.add("button", FakeElement::visible().with_text(" Submit "));
    let out = tempfile::tempdir().unwrap();
    let runner = runner(&page, &out);

    let scenario = Scenario::from_yaml(
        r#"
name: submit-leave
steps:
  - action: click
    selector: '#submit'
    description: submit leave
    retry: false
  - action: log
    message: never reached
"#,
    )
    .unwrap();
    let result = runner.run_scenario(&scenario).await;

    assert!(!result.success);
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].attempts, 1);
    assert!(result.error.as_deref().unwrap().contains("submit leave"));

    let snapshot = result.failure_snapshot.expect("snapshot on failure");
    assert_eq!(snapshot.title.as_deref(), Some("Leave Application"));
    assert_eq!(snapshot.candidates.len(), 5);
    assert_eq!(snapshot.controls[0].text.as_deref(), Some("Submit"));

    let screenshot = result.failure_screenshot.expect("screenshot on failure");
    assert!(screenshot.starts_with(out.path().join("screenshots")));
    assert!(screenshot.exists());
}

#[tokio::test(start_paused = true)]
async fn report_download_is_checked() {
    let page = FakePage::new();
    page.add(
        r#"button:has-text("Excel")"#,
        FakeElement::visible().on_click_event(
            EventKind::Download,
            "https://pihr.test/files/job-card.xlsx",
            Some("job-card.xlsx"),
        ),
    );
    let out = tempfile::tempdir().unwrap();
    let runner = runner(&page, &out);

    let ok = Scenario::from_yaml(
        r#"
name: excel
steps:
  - action: expect_event
    selector: 'button:has-text("Excel")'
    event: download
    filename_suffix: .xlsx
"#,
    )
    .unwrap();
    assert!(runner.run_scenario(&ok).await.success);

    let wrong = Scenario::from_yaml(
        r#"
name: pdf
retry:
  max_attempts: 1
steps:
  - action: expect_event
    selector: 'button:has-text("Excel")'
    event: download
    filename_suffix: .pdf
"#,
    )
    .unwrap();
    let result = runner.run_scenario(&wrong).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains(".pdf"));
}

#[tokio::test(start_paused = true)]
async fn missing_popup_times_out() {
    let page = FakePage::new();
    page.add("#open", FakeElement::visible());
    let out = tempfile::tempdir().unwrap();
    let runner = runner(&page, &out);

    let scenario = Scenario::from_yaml(
        r#"
name: popup
retry:
  max_attempts: 1
steps:
  - action: expect_event
    selector: '#open'
    event: popup
    timeout_ms: 1500
"#,
    )
    .unwrap();

    let start = tokio::time::Instant::now();
    let result = runner.run_scenario(&scenario).await;

    assert!(!result.success);
    assert_eq!(start.elapsed(), Duration::from_millis(1500));
    assert!(result.error.unwrap().contains("Timeout after 1500ms"));
}

#[tokio::test(start_paused = true)]
async fn suite_counts_and_results_file() {
    let page = login_page();
    let out = tempfile::tempdir().unwrap();
    let runner = runner(&page, &out);

    let scenarios = vec![
        Scenario::from_yaml(LOGIN).unwrap(),
        Scenario::from_yaml(
            "name: skipped\nskip: true\nsteps:\n  - action: sleep\n    ms: 10\n",
        )
        .unwrap(),
        Scenario::from_yaml(
            "name: broken\nretry:\n  max_attempts: 1\nsteps:\n  - action: assert_url\n    contains: reports\n",
        )
        .unwrap(),
    ];

    let suite = runner.run_all(&scenarios).await;
    assert_eq!(suite.total, 3);
    assert_eq!(suite.passed, 1);
    assert_eq!(suite.skipped, 1);
    assert_eq!(suite.failed, 1);

    let path = runner.write_results(&suite).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written["failed"], 1);
    assert_eq!(written["results"][2]["name"], "broken");
}

#[tokio::test(start_paused = true)]
async fn tag_filter_selects_scenarios() {
    let page = FakePage::new();
    let out = tempfile::tempdir().unwrap();
    let runner = runner(&page, &out);

    let scenarios = vec![
        Scenario::from_yaml("name: a\ntags: [smoke]\nsteps:\n  - action: log\n    message: a\n")
            .unwrap(),
        Scenario::from_yaml("name: b\nsteps:\n  - action: log\n    message: b\n").unwrap(),
    ];

    let suite = runner.run_tagged(&scenarios, "smoke").await;
    assert_eq!(suite.total, 1);
    assert_eq!(suite.results[0].name, "a");
    assert!(runner.context().events().contains("a"));
}

#[tokio::test(start_paused = true)]
async fn bundled_logout_clicks_menu_item_once() {
    let page = FakePage::new();
    page.add(r#"role=img[name="profile"]"#, FakeElement::visible());
    page.add(
        r#"role=menuitem[name="Logout"]"#,
        FakeElement::visible()
            .failing_clicks(1)
            .on_click_navigate("https://pihr.test/login"),
    );
    let out = tempfile::tempdir().unwrap();
    let runner = runner(&page, &out);
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/logout.yaml");
    let scenario = Scenario::from_file(&path).unwrap();

    let result = runner.run_scenario(&scenario).await;

    // A failed logout click is not repeated
    assert!(!result.success);
    assert_eq!(result.steps.last().unwrap().step_name, "click:Logout menu item");
    assert_eq!(result.steps.last().unwrap().attempts, 1);

    page.remove(r#"role=menuitem[name="Logout"]"#);
    page.add(
        r#"role=menuitem[name="Logout"]"#,
        FakeElement::visible().on_click_navigate("https://pihr.test/login"),
    );
    let result = runner.run_scenario(&scenario).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(page.clicks(r#"role=menuitem[name="Logout"]"#), 1);
}

#[test]
fn bundled_scenarios_and_config_load() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));

    let scenarios = Scenario::load_all(&root.join("scenarios")).unwrap();
    let names: Vec<_> = scenarios.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["job-card-reports", "login", "monthly-attendance", "session-logout"]
    );
    assert_eq!(Scenario::filter_by_tag(&scenarios, "reports").len(), 2);
    assert_eq!(Scenario::filter_by_tag(&scenarios, "auth").len(), 2);

    let logout = &scenarios[3];
    assert_eq!(logout.steps.len(), 5);
    assert!(matches!(
        logout.steps[3],
        UiAction::Click { retry: false, .. }
    ));
    assert!(matches!(
        &logout.steps[4],
        UiAction::AssertUrl { contains } if contains == "/login"
    ));

    let config = SuiteConfig::load(&root.join("e2e.toml")).unwrap();
    assert_eq!(config.base_url, "https://webable.pihr.xyz");
    assert_eq!(config.retry.max_attempts(), 3);
    assert_eq!(config.diagnostics.candidates.len(), 5);
}
