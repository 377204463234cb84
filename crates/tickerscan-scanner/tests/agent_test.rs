mod common;

use chrono::Utc;
use common::{
    mention, open_limits, platform, targets, Harness, Script, ScriptedScanner, SlowLogin,
};
use std::sync::Arc;
use std::time::Duration;
use tickerscan_browser::{BrowserSession, Credentials, LoginRegistry, PlatformLogin};
use tickerscan_core::{load_json, AgentProgress, KeywordScorer, PlatformLimits, ScanningConfig};
use tickerscan_scanner::{
    AgentControl, AgentState, EvidenceCollector, EvidenceRecord, ScanAgent, ScanWorker,
    BUDGET_EXHAUSTED, SUSPENDED,
};

fn evidence_key() -> String {
    format!("evidence/{}.json", Utc::now().format("%Y-%m-%d"))
}

fn agent(harness: &Harness, scanner: &Arc<ScriptedScanner>) -> ScanAgent {
    ScanAgent::new(scanner.clone(), harness.services.clone())
}

#[tokio::test]
async fn test_clean_run_scans_in_order_and_deletes_checkpoint() {
    let harness = Harness::new(&["reddit"]);
    let scanner = Arc::new(
        ScriptedScanner::new(platform("reddit")).with("WXYZ", Script::Mentions(vec![10, 20])),
    );
    let control = Arc::new(AgentControl::new());

    let report = agent(&harness, &scanner)
        .run(&targets(&["ABCD", "WXYZ", "QRST"]), control.clone())
        .await;

    assert!(report.result.success);
    assert!(!report.suspended);
    assert_eq!(report.tickers_completed, 3);
    assert_eq!(report.tickers_total, 3);
    assert_eq!(report.result.mentions_found, 4);
    assert_eq!(scanner.scanned(), vec!["ABCD", "WXYZ", "QRST"]);
    assert_eq!(control.state(), AgentState::Done);

    assert!(!harness.checkpoints().exists(&platform("reddit")).unwrap());
    assert_eq!(harness.launcher.launched(), 1);
    assert_eq!(harness.launcher.closed(), 1);
    assert_eq!(harness.cost.usage().session_count, 1);
}

#[tokio::test]
async fn test_resume_skips_completed_tickers_and_keeps_their_mentions() {
    let harness = Harness::new(&["reddit"]);
    let reddit = platform("reddit");
    let all = targets(&["ABCD", "WXYZ", "QRST"]);

    let mut saved = AgentProgress::new(reddit.clone(), &all, Utc::now());
    saved.complete_ticker("ABCD", vec![mention(&reddit, "ABCD", 90)]);
    harness.checkpoints().save(&saved).unwrap();

    let scanner = Arc::new(ScriptedScanner::new(reddit.clone()));
    let report = agent(&harness, &scanner)
        .run(&all, Arc::new(AgentControl::new()))
        .await;

    assert_eq!(scanner.scanned(), vec!["WXYZ", "QRST"]);
    assert_eq!(report.tickers_completed, 3);
    let tickers: Vec<&str> = report
        .result
        .mentions
        .iter()
        .map(|m| m.ticker.as_str())
        .collect();
    assert_eq!(tickers, vec!["ABCD", "WXYZ", "QRST"]);
    assert!(!harness.checkpoints().exists(&reddit).unwrap());
}

#[tokio::test]
async fn test_resume_targets_only_the_remaining_ticker() {
    let harness = Harness::new(&["reddit"]);
    let reddit = platform("reddit");
    let all = targets(&["ABCD", "WXYZ", "QRST", "LMNO"]);

    let mut saved = AgentProgress::new(reddit.clone(), &all, Utc::now());
    for ticker in ["ABCD", "WXYZ", "QRST"] {
        saved.complete_ticker(ticker, Vec::new());
    }
    harness.checkpoints().save(&saved).unwrap();

    let scanner = Arc::new(ScriptedScanner::new(reddit));
    agent(&harness, &scanner)
        .run(&all, Arc::new(AgentControl::new()))
        .await;
    assert_eq!(scanner.scanned(), vec!["LMNO"]);
}

#[tokio::test]
async fn test_mismatched_checkpoint_is_ignored() {
    let harness = Harness::new(&["reddit"]);
    let reddit = platform("reddit");

    let mut stale = AgentProgress::new(reddit.clone(), &targets(&["OLD1", "OLD2"]), Utc::now());
    stale.complete_ticker("OLD1", Vec::new());
    harness.checkpoints().save(&stale).unwrap();

    let scanner = Arc::new(ScriptedScanner::new(reddit));
    agent(&harness, &scanner)
        .run(&targets(&["ABCD", "WXYZ"]), Arc::new(AgentControl::new()))
        .await;
    assert_eq!(scanner.scanned(), vec!["ABCD", "WXYZ"]);
}

#[tokio::test]
async fn test_transient_failure_skips_only_that_ticker() {
    let harness = Harness::new(&["reddit"]);
    let scanner = Arc::new(
        ScriptedScanner::new(platform("reddit"))
            .with("ABCD", Script::Transient)
            .with("WXYZ", Script::Mentions(vec![30])),
    );

    let report = agent(&harness, &scanner)
        .run(&targets(&["ABCD", "WXYZ"]), Arc::new(AgentControl::new()))
        .await;

    assert!(report.result.success);
    assert_eq!(report.tickers_completed, 2);
    assert_eq!(report.result.mentions.len(), 1);
    assert_eq!(report.result.mentions[0].ticker, "WXYZ");
    // both tickers counted against the rate limiter
    let usage = harness.services.rate_limiter.usage(&platform("reddit"));
    assert_eq!(usage.pages_used_today, 2);
}

#[tokio::test]
async fn test_no_budget_fails_before_launching() {
    let harness = Harness::with_budget(&["reddit"], 0.0, open_limits());
    let scanner = Arc::new(ScriptedScanner::new(platform("reddit")));
    let control = Arc::new(AgentControl::new());

    let report = agent(&harness, &scanner)
        .run(&targets(&["ABCD"]), control.clone())
        .await;

    assert!(!report.result.success);
    assert_eq!(report.result.error.as_deref(), Some(BUDGET_EXHAUSTED));
    assert_eq!(harness.launcher.launched(), 0);
    assert_eq!(harness.cost.usage().session_count, 0);
    assert_eq!(control.state(), AgentState::Failed);
}

#[tokio::test]
async fn test_rate_limit_stops_early_as_partial_success() {
    let limits = PlatformLimits {
        per_minute_max: 2,
        ..open_limits()
    };
    let harness = Harness::with_budget(&["reddit"], 240.0, limits);
    let scanner = Arc::new(ScriptedScanner::new(platform("reddit")));

    let report = agent(&harness, &scanner)
        .run(&targets(&["ABCD", "WXYZ", "QRST", "LMNO"]), Arc::new(AgentControl::new()))
        .await;

    assert!(report.result.success);
    assert_eq!(report.tickers_completed, 2);
    assert_eq!(scanner.scanned(), vec!["ABCD", "WXYZ"]);

    let saved = harness.checkpoints().load(&platform("reddit")).unwrap().unwrap();
    assert_eq!(saved.completed_tickers, vec!["ABCD", "WXYZ"]);
    let remaining: Vec<&str> = saved.remaining_tickers.iter().map(|t| t.ticker.as_str()).collect();
    assert_eq!(remaining, vec!["QRST", "LMNO"]);
}

#[tokio::test]
async fn test_launch_failure_is_isolated() {
    let harness = Harness::new(&["reddit"]);
    harness
        .launcher
        .fail
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let scanner = Arc::new(ScriptedScanner::new(platform("reddit")));

    let report = agent(&harness, &scanner)
        .run(&targets(&["ABCD"]), Arc::new(AgentControl::new()))
        .await;

    assert!(!report.result.success);
    assert!(report.result.error.unwrap().contains("launch"));
    assert!(scanner.scanned().is_empty());
    // the cost session opened for the attempt is closed again
    assert_eq!(harness.cost.usage().session_count, 1);
}

struct NeverVerified(tickerscan_core::Platform);

#[async_trait::async_trait]
impl PlatformLogin for NeverVerified {
    fn platform(&self) -> &tickerscan_core::Platform {
        &self.0
    }
    async fn verify_session(&self, _session: &dyn BrowserSession) -> tickerscan_browser::Result<bool> {
        Ok(false)
    }
    async fn login(
        &self,
        _session: &dyn BrowserSession,
        _credentials: &Credentials,
    ) -> tickerscan_browser::Result<bool> {
        Ok(false)
    }
}

#[tokio::test]
async fn test_missing_credentials_fail_the_agent_and_close_the_session() {
    let id = "needs-login";
    let registry = LoginRegistry::new().with(Arc::new(NeverVerified(platform(id))));
    let harness = Harness::build(&[id], 240.0, open_limits(), registry);
    let scanner = Arc::new(ScriptedScanner::new(platform(id)));

    let report = agent(&harness, &scanner)
        .run(&targets(&["ABCD"]), Arc::new(AgentControl::new()))
        .await;

    assert!(!report.result.success);
    assert!(report.result.error.unwrap().contains("credentials"));
    assert_eq!(harness.launcher.launched(), 1);
    assert_eq!(harness.launcher.closed(), 1);
    assert!(scanner.scanned().is_empty());
}

#[tokio::test]
async fn test_high_scoring_mentions_become_evidence() {
    let mut harness = Harness::new(&["reddit"]);
    let evidence = Arc::new(EvidenceCollector::new(harness.store.clone()));
    harness.services.evidence = Some(evidence.clone());
    let scanner = Arc::new(
        ScriptedScanner::new(platform("reddit"))
            .with("ABCD", Script::Mentions(vec![85, 5]))
            .with("WXYZ", Script::Mentions(vec![40])),
    );

    agent(&harness, &scanner)
        .run(&targets(&["ABCD", "WXYZ"]), Arc::new(AgentControl::new()))
        .await;

    // written as each ticker completes
    assert_eq!(evidence.pending_count(), 0);
    let saved: Vec<EvidenceRecord> = load_json(harness.store.as_ref(), &evidence_key())
        .unwrap()
        .unwrap();
    let scores: Vec<u8> = saved.iter().map(|r| r.promotion_score).collect();
    assert_eq!(scores, vec![85, 40]);
    assert_eq!(harness.launcher.screenshots(), 2);
    let shots = harness
        .store
        .keys()
        .into_iter()
        .filter(|k| k.starts_with("evidence/screenshots/reddit-"))
        .count();
    assert!(shots >= 1);
}

#[tokio::test]
async fn test_scorer_rescores_mentions() {
    let mut harness = Harness::new(&["reddit"]);
    harness.services.scorer = Some(Arc::new(KeywordScorer::new([(
        "to the moon".to_string(),
        133,
    )])));
    let scanner = Arc::new(ScriptedScanner::new(platform("reddit")));

    let report = agent(&harness, &scanner)
        .run(&targets(&["ABCD"]), Arc::new(AgentControl::new()))
        .await;

    let m = &report.result.mentions[0];
    assert_eq!(m.promotion_score, 100);
    assert!(m.is_promotional);
}

#[tokio::test]
async fn test_suspend_saves_checkpoint_with_in_flight_ticker_remaining() {
    let harness = Harness::new(&["reddit"]);
    let scanner = Arc::new(
        ScriptedScanner::new(platform("reddit")).with_delay(Duration::from_millis(100)),
    );
    let control = Arc::new(AgentControl::new());

    let worker = agent(&harness, &scanner);
    let all = targets(&["ABCD", "WXYZ", "QRST", "LMNO"]);
    let run = tokio::spawn({
        let control = control.clone();
        let all = all.clone();
        async move { worker.run(&all, control).await }
    });

    // mid-way through the second ticker
    tokio::time::sleep(Duration::from_millis(150)).await;
    control.suspend().await;
    let report = run.await.unwrap();

    assert!(report.suspended);
    assert_eq!(report.result.error.as_deref(), Some(SUSPENDED));
    assert_eq!(control.state(), AgentState::Failed);
    assert_eq!(harness.launcher.closed(), 1);

    let saved = harness.checkpoints().load(&platform("reddit")).unwrap().unwrap();
    assert_eq!(saved.completed_tickers, vec!["ABCD"]);
    assert_eq!(saved.remaining_tickers.len(), 3);
    assert_eq!(saved.remaining_tickers[0].ticker, "WXYZ");
    assert!(saved.matches_targets(&all));
}

#[tokio::test]
async fn test_failure_after_a_good_ticker_keeps_the_good_mentions() {
    let harness = Harness::new(&["reddit"]);
    let scanner = Arc::new(
        ScriptedScanner::new(platform("reddit"))
            .with("ABCD", Script::Mentions(vec![30, 50]))
            .with("WXYZ", Script::Transient),
    );

    let report = agent(&harness, &scanner)
        .run(&targets(&["ABCD", "WXYZ"]), Arc::new(AgentControl::new()))
        .await;

    assert!(report.result.success);
    assert!(report.result.error.is_none());
    assert_eq!(report.tickers_completed, 2);
    assert_eq!(report.result.mentions_found, 2);
    assert!(report.result.mentions.iter().all(|m| m.ticker == "ABCD"));
    assert!(!harness.checkpoints().exists(&platform("reddit")).unwrap());
}

#[tokio::test]
async fn test_scanner_scores_are_clamped_without_a_scorer() {
    let harness = Harness::new(&["reddit"]);
    let scanner =
        Arc::new(ScriptedScanner::new(platform("reddit")).with("ABCD", Script::RawScore(200)));

    let report = agent(&harness, &scanner)
        .run(&targets(&["ABCD"]), Arc::new(AgentControl::new()))
        .await;

    let m = &report.result.mentions[0];
    assert_eq!(m.promotion_score, 100);
    assert!(m.is_promotional);
}

#[tokio::test]
async fn test_budget_running_out_mid_run_stops_and_keeps_checkpoint() {
    let harness = Harness::with_budget(&["reddit"], 5.0, open_limits());
    let scanner = Arc::new(
        ScriptedScanner::new(platform("reddit"))
            .with("WXYZ", Script::Spend(harness.cost.clone(), 10)),
    );
    let control = Arc::new(AgentControl::new());

    let report = agent(&harness, &scanner)
        .run(&targets(&["ABCD", "WXYZ", "QRST", "LMNO"]), control.clone())
        .await;

    assert!(report.result.success);
    assert!(!report.suspended);
    assert_eq!(report.tickers_completed, 2);
    assert_eq!(scanner.scanned(), vec!["ABCD", "WXYZ"]);
    assert_eq!(control.state(), AgentState::Done);

    let saved = harness.checkpoints().load(&platform("reddit")).unwrap().unwrap();
    assert_eq!(saved.completed_tickers, vec!["ABCD", "WXYZ"]);
    let remaining: Vec<&str> = saved.remaining_tickers.iter().map(|t| t.ticker.as_str()).collect();
    assert_eq!(remaining, vec!["QRST", "LMNO"]);
}

#[tokio::test]
async fn test_lost_session_fails_the_agent_but_keeps_progress() {
    let harness = Harness::new(&["reddit"]);
    let scanner = Arc::new(
        ScriptedScanner::new(platform("reddit"))
            .with("ABCD", Script::Mentions(vec![20]))
            .with("WXYZ", Script::LoseSession),
    );
    let control = Arc::new(AgentControl::new());

    let report = agent(&harness, &scanner)
        .run(&targets(&["ABCD", "WXYZ", "QRST"]), control.clone())
        .await;

    assert!(!report.result.success);
    assert!(!report.suspended);
    assert!(report.result.error.is_some());
    assert_ne!(report.result.error.as_deref(), Some(SUSPENDED));
    assert_eq!(report.result.mentions.len(), 1);
    assert_eq!(report.result.mentions[0].ticker, "ABCD");
    assert_eq!(scanner.scanned(), vec!["ABCD", "WXYZ"]);
    assert_eq!(control.state(), AgentState::Failed);

    // the last per-ticker checkpoint survives for the next run
    let saved = harness.checkpoints().load(&platform("reddit")).unwrap().unwrap();
    assert_eq!(saved.completed_tickers, vec!["ABCD"]);
    assert_eq!(saved.remaining_tickers[0].ticker, "WXYZ");
}

#[tokio::test]
async fn test_suspend_during_login_is_a_suspension_and_keeps_the_checkpoint() {
    let id = "reddit";
    let registry =
        LoginRegistry::new().with(Arc::new(SlowLogin::new(id, Duration::from_millis(200))));
    let harness = Harness::build(&[id], 240.0, open_limits(), registry);
    let reddit = platform(id);
    let all = targets(&["ABCD", "WXYZ", "QRST"]);

    let mut earlier = AgentProgress::new(reddit.clone(), &all, Utc::now());
    earlier.complete_ticker("ABCD", vec![mention(&reddit, "ABCD", 60)]);
    harness.checkpoints().save(&earlier).unwrap();

    let scanner = Arc::new(ScriptedScanner::new(reddit.clone()));
    let worker = agent(&harness, &scanner);
    let control = Arc::new(AgentControl::new());
    let run = tokio::spawn({
        let control = control.clone();
        let all = all.clone();
        async move { worker.run(&all, control).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    control.suspend().await;
    let report = run.await.unwrap();

    assert!(report.suspended);
    assert_eq!(report.result.error.as_deref(), Some(SUSPENDED));
    assert!(scanner.scanned().is_empty());
    assert_eq!(harness.launcher.closed(), 1);

    let saved = harness.checkpoints().load(&reddit).unwrap().unwrap();
    assert_eq!(saved.completed_tickers, vec!["ABCD"]);
    assert_eq!(saved.mentions_so_far.len(), 1);
}

#[tokio::test]
async fn test_evidence_is_on_disk_before_a_suspension() {
    let mut harness = Harness::new(&["reddit"]);
    let evidence = Arc::new(EvidenceCollector::new(harness.store.clone()));
    harness.services.evidence = Some(evidence.clone());
    let scanner = Arc::new(
        ScriptedScanner::new(platform("reddit"))
            .with("ABCD", Script::Mentions(vec![90]))
            .with("WXYZ", Script::Mentions(vec![95]))
            .with_delay(Duration::from_millis(100)),
    );
    let control = Arc::new(AgentControl::new());

    let worker = agent(&harness, &scanner);
    let run = tokio::spawn({
        let control = control.clone();
        async move {
            let all = targets(&["ABCD", "WXYZ", "QRST"]);
            worker.run(&all, control).await
        }
    });

    // mid-way through the second ticker
    tokio::time::sleep(Duration::from_millis(150)).await;
    control.suspend().await;
    let report = run.await.unwrap();
    assert!(report.suspended);

    let saved: Vec<EvidenceRecord> = load_json(harness.store.as_ref(), &evidence_key())
        .unwrap()
        .unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].ticker, "ABCD");
    assert_eq!(evidence.pending_count(), 0);

    let checkpoint = harness.checkpoints().load(&platform("reddit")).unwrap().unwrap();
    assert_eq!(checkpoint.completed_tickers, vec!["ABCD"]);
}

#[test]
fn test_footprint_comes_from_config() {
    let harness = Harness::new(&["reddit"]);
    let scanner = Arc::new(ScriptedScanner::new(platform("reddit")));
    let config = ScanningConfig {
        agent_footprint_mb: 900,
        ..ScanningConfig::default()
    };

    let configured = ScanAgent::from_config(scanner.clone(), harness.services.clone(), &config);
    assert_eq!(configured.footprint_mb(), 900);
    assert_eq!(
        agent(&harness, &scanner).footprint_mb(),
        ScanningConfig::default().agent_footprint_mb
    );
}
