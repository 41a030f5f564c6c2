//! End-to-end: appends to a daily log travel through the watcher, debouncer and
//! pipeline to a hub subscriber.

use chrono::Utc;
use optflow_backend::logs::{log_file_for_ticker_and_date, today};
use optflow_backend::notifications::NotificationRule;
use optflow_backend::{Config, PeriodSummary, Service};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

fn fast_config(base: &Path) -> Config {
    let mut config = Config::rooted_at(base, "pipeline-test-secret");
    config.poll_interval = Duration::from_millis(20);
    config.debounce = Duration::from_millis(50);
    config
}

fn append_line(path: &Path, line: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(line.as_bytes()).unwrap();
}

fn tick_line(symbol: &str, volume: i64, vwap: f64, start_ms: i64) -> String {
    format!(
        "{{\"ev\":\"A\",\"sym\":\"{}\",\"v\":{},\"vw\":{},\"s\":{},\"e\":{}}}\n",
        symbol,
        volume,
        vwap,
        start_ms,
        start_ms + 1000
    )
}

/// Next update whose call volume reaches `volume`, skipping intermediate ones.
async fn wait_for_call_volume(rx: &mut Receiver<String>, volume: i64) -> PeriodSummary {
    timeout(Duration::from_secs(5), async {
        loop {
            let text = rx.recv().await.expect("hub closed the subscription");
            let summary: PeriodSummary = serde_json::from_str(&text).unwrap();
            if summary.call_volume >= volume {
                return summary;
            }
        }
    })
    .await
    .expect("timed out waiting for update")
}

#[tokio::test]
async fn test_appended_ticks_reach_subscriber() {
    let dir = tempfile::tempdir().unwrap();
    let service = Service::build(fast_config(dir.path())).unwrap();
    let config = service.state.config.clone();
    let (_id, mut rx) = service.state.hub.register("AAPL");
    let tasks = service.spawn_background();

    let path = log_file_for_ticker_and_date(&config.log_dir, "AAPL", today(&config.timezone));
    let start = Utc::now().timestamp_millis();

    append_line(&path, &tick_line("O:AAPL250117C00150000", 10, 2.0, start));
    let first = wait_for_call_volume(&mut rx, 10).await;
    assert_eq!(first.call_premium, 2000.0);
    assert_eq!(first.put_premium, 0.0);
    assert_eq!(first.call_put_ratio, -1.0);

    // A half-written record is held back until its newline lands.
    let put = tick_line("O:AAPL250117P00150000", 4, 5.0, start);
    let (head, tail) = put.split_at(20);
    append_line(&path, head);
    tokio::time::sleep(Duration::from_millis(200)).await;
    append_line(&path, tail);
    append_line(&path, &tick_line("O:AAPL250117C00150000", 5, 2.0, start));

    let latest = wait_for_call_volume(&mut rx, 15).await;
    assert_eq!(latest.call_premium, 3000.0);
    assert_eq!(latest.put_volume, 4);
    assert_eq!(latest.put_premium, 2000.0);
    assert_eq!(latest.total_premium, 5000.0);
    assert_eq!(latest.call_put_ratio, 1.5);

    for task in tasks {
        task.abort();
    }
}

#[tokio::test]
async fn test_first_append_after_settled_history_is_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let service = Service::build(fast_config(dir.path())).unwrap();
    let config = service.state.config.clone();
    let path = log_file_for_ticker_and_date(&config.log_dir, "AAPL", today(&config.timezone));
    let now = Utc::now().timestamp_millis();
    // Long settled, so the first bootstrap starts at the end of the file.
    append_line(&path, &tick_line("O:AAPL250117C00150000", 1, 1.0, now - 20 * 60_000));

    let (_id, mut rx) = service.state.hub.register("AAPL");
    let tasks = service.spawn_background();
    append_line(&path, &tick_line("O:AAPL250117C00150000", 6, 1.0, now));

    let summary = wait_for_call_volume(&mut rx, 6).await;
    assert_eq!(summary.call_volume, 6);
    assert_eq!(summary.call_premium, 600.0);

    for task in tasks {
        task.abort();
    }
}

#[tokio::test]
async fn test_other_tickers_are_not_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let service = Service::build(fast_config(dir.path())).unwrap();
    let config = service.state.config.clone();
    let (_id, mut rx) = service.state.hub.register("AAPL");
    let tasks = service.spawn_background();

    let date = today(&config.timezone);
    let start = Utc::now().timestamp_millis();
    append_line(
        &log_file_for_ticker_and_date(&config.log_dir, "TSLA", date),
        &tick_line("O:TSLA250117C00200000", 50, 1.0, start),
    );
    append_line(
        &log_file_for_ticker_and_date(&config.log_dir, "AAPL", date),
        &tick_line("O:AAPL250117C00150000", 3, 1.0, start),
    );

    let summary = wait_for_call_volume(&mut rx, 3).await;
    assert_eq!(summary.call_volume, 3);
    // TSLA has no subscriber and no rule, so it was never tracked.
    assert_eq!(service.pipeline.registry().tickers(), vec!["AAPL".to_string()]);

    for task in tasks {
        task.abort();
    }
}

#[tokio::test]
async fn test_rule_alone_tracks_ticker() {
    let dir = tempfile::tempdir().unwrap();
    let service = Service::build(fast_config(dir.path())).unwrap();
    let config = service.state.config.clone();
    service
        .state
        .rules
        .put_rule(
            "user-1",
            NotificationRule {
                ticker: "NVDA".to_string(),
                call_premium_threshold: 1.0,
                ..Default::default()
            },
        )
        .unwrap();
    let tasks = service.spawn_background();

    let start = Utc::now().timestamp_millis();
    append_line(
        &log_file_for_ticker_and_date(&config.log_dir, "NVDA", today(&config.timezone)),
        &tick_line("O:NVDA250117C00900000", 2, 3.0, start),
    );

    timeout(Duration::from_secs(5), async {
        while service.pipeline.registry().get("NVDA").is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("rule-watched ticker was never tracked");

    for task in tasks {
        task.abort();
    }
}
