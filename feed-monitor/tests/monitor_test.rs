use feed_monitor::{
    FeedItem, MockOperator, Monitor, MonitorConfig, PollState, TipStatus, MAX_POSTS, NEW_SORT,
};
use futures::StreamExt;
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing::info;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .try_init()
            .ok();
    });
}

fn posts(names: &[&str]) -> Vec<FeedItem> {
    names.iter().map(|name| FeedItem::new(*name)).collect()
}

fn quiet_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval: Duration::from_millis(10),
        repair_every_cycles: 0,
        suspicion_threshold: 0,
        ..MonitorConfig::default()
    }
}

#[tokio::test]
async fn test_new_posts_are_published_and_advance_cursor() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    operator.push_scrape(posts(&["t3_b", "t3_a"])).await;
    operator.push_scrape(posts(&["t3_c"])).await;

    let (mut monitor, handle, mut streams) = Monitor::new(operator.clone(), quiet_config());
    handle.monitor_subreddits(["tech", "news"]).await;

    let report = monitor.poll_once().await;
    info!("First cycle: {:?}", report);
    assert_eq!(
        report.states,
        vec![PollState::Fetching, PollState::Absorbing, PollState::Publishing, PollState::Idle]
    );
    assert_eq!(report.fetched, 2);
    assert_eq!(report.new_items, 2);
    assert!(!report.failed);
    assert_eq!(monitor.tip().front(), "t3_b");

    // Published oldest first.
    assert_eq!(streams.new_posts.recv().await.map(|p| p.name).as_deref(), Some("t3_a"));
    assert_eq!(streams.new_posts.recv().await.map(|p| p.name).as_deref(), Some("t3_b"));

    monitor.poll_once().await;
    assert_eq!(monitor.tip().front(), "t3_c");
    assert_eq!(monitor.tip().ids(), vec!["t3_c", "t3_b", "t3_a"]);

    let calls = operator.scrape_calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].query, "news+tech");
    assert_eq!(calls[0].sort, NEW_SORT);
    assert_eq!(calls[0].after, "");
    assert_eq!(calls[0].before, "");
    assert_eq!(calls[0].limit, MAX_POSTS);
    assert_eq!(calls[1].before, "t3_b");
}

#[tokio::test]
async fn test_empty_registry_skips_fetch() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    let (mut monitor, _handle, _streams) = Monitor::new(operator.clone(), quiet_config());

    let report = monitor.poll_once().await;

    assert_eq!(report.states, vec![PollState::Fetching, PollState::Publishing, PollState::Idle]);
    assert!(!report.failed);
    assert!(operator.scrape_calls().await.is_empty());
    assert!(operator.resolve_calls().await.is_empty());
}

#[tokio::test]
async fn test_fetch_error_skips_cycle_and_reaches_sink() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    operator.push_scrape(posts(&["t3_a"])).await;
    operator.push_scrape_error("503 from upstream").await;

    let (mut monitor, handle, mut streams) = Monitor::new(operator.clone(), quiet_config());
    handle.monitor_subreddits(["news"]).await;
    handle.monitor_threads(["t3_watched"]).await;

    monitor.poll_once().await;
    let resolves_before = operator.resolve_calls().await.len();

    let report = monitor.poll_once().await;

    assert!(report.failed);
    assert_eq!(report.states, vec![PollState::Fetching, PollState::Idle]);
    assert_eq!(monitor.tip().front(), "t3_a");
    assert_eq!(operator.resolve_calls().await.len(), resolves_before);

    let error = streams.errors.recv().await.expect("error should be surfaced");
    assert!(error.to_string().contains("503 from upstream"));

    // The next cycle goes ahead as usual.
    let report = monitor.poll_once().await;
    assert!(!report.failed);
    assert_eq!(operator.scrape_calls().await.last().map(|c| c.before.clone()).as_deref(), Some("t3_a"));
}

#[tokio::test]
async fn test_empty_streak_triggers_repair_and_refetch() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    operator.push_scrape(posts(&["t3_b", "t3_a"])).await;
    operator.push_scrape(Vec::new()).await;
    operator.push_scrape(Vec::new()).await;
    operator.push_scrape(posts(&["t3_c"])).await;
    // t3_b was deleted upstream.
    operator.set_live(posts(&["t3_a"])).await;

    let config = MonitorConfig {
        suspicion_threshold: 2,
        ..quiet_config()
    };
    let (mut monitor, handle, mut streams) = Monitor::new(operator.clone(), config);
    handle.monitor_subreddits(["news"]).await;

    monitor.poll_once().await;
    let second = monitor.poll_once().await;
    assert!(second.tip_status.is_none());

    let third = monitor.poll_once().await;
    info!("Repair cycle: {:?}", third);
    assert_eq!(
        third.states,
        vec![
            PollState::Fetching,
            PollState::Absorbing,
            PollState::Repairing,
            PollState::Fetching,
            PollState::Absorbing,
            PollState::Publishing,
            PollState::Idle,
        ]
    );
    assert_eq!(third.tip_status, Some(TipStatus::Repaired { evicted: "t3_b".to_string() }));
    assert_eq!(third.new_items, 1);
    assert_eq!(monitor.tip().front(), "t3_c");

    let calls = operator.scrape_calls().await;
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[2].before, "t3_b");
    assert_eq!(calls[3].before, "t3_a");

    let published: Vec<String> = std::iter::from_fn(|| streams.new_posts.try_recv().ok())
        .map(|post| post.name)
        .collect();
    assert_eq!(published, vec!["t3_a", "t3_b", "t3_c"]);
}

#[tokio::test]
async fn test_scheduled_repair_of_valid_tip() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    operator.push_scrape(posts(&["t3_a"])).await;
    operator.set_live(posts(&["t3_a"])).await;

    let config = MonitorConfig {
        repair_every_cycles: 1,
        ..quiet_config()
    };
    let (mut monitor, handle, _streams) = Monitor::new(operator.clone(), config);
    handle.monitor_subreddits(["news"]).await;

    let report = monitor.poll_once().await;

    assert_eq!(report.tip_status, Some(TipStatus::Valid));
    assert_eq!(
        report.states,
        vec![
            PollState::Fetching,
            PollState::Absorbing,
            PollState::Repairing,
            PollState::Publishing,
            PollState::Idle,
        ]
    );
    assert_eq!(operator.scrape_calls().await.len(), 1);
}

#[tokio::test]
async fn test_exhausted_tip_falls_back_to_broad_fetch() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    operator.push_scrape(posts(&["t3_only"])).await;
    operator.push_scrape(Vec::new()).await;
    operator.push_scrape(posts(&["t3_new"])).await;

    let config = MonitorConfig {
        suspicion_threshold: 1,
        ..quiet_config()
    };
    let (mut monitor, handle, _streams) = Monitor::new(operator.clone(), config);
    handle.monitor_subreddits(["news"]).await;

    monitor.poll_once().await;
    let report = monitor.poll_once().await;

    assert_eq!(report.tip_status, Some(TipStatus::Exhausted { evicted: "t3_only".to_string() }));
    let calls = operator.scrape_calls().await;
    assert_eq!(calls.last().map(|c| c.before.as_str()), Some(""));
    assert_eq!(monitor.tip().front(), "t3_new");
}

#[tokio::test]
async fn test_known_posts_are_not_republished() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    operator.push_scrape(posts(&["t3_b", "t3_a"])).await;
    operator.push_scrape(posts(&["t3_c", "t3_b"])).await;

    let (mut monitor, handle, mut streams) = Monitor::new(operator.clone(), quiet_config());
    handle.monitor_subreddits(["news"]).await;

    monitor.poll_once().await;
    let report = monitor.poll_once().await;

    assert_eq!(report.fetched, 2);
    assert_eq!(report.new_items, 1);
    assert_eq!(monitor.tip().ids(), vec!["t3_c", "t3_b", "t3_a"]);

    let published: Vec<String> = std::iter::from_fn(|| streams.new_posts.try_recv().ok())
        .map(|post| post.name)
        .collect();
    assert_eq!(published, vec!["t3_a", "t3_b", "t3_c"]);
}

#[tokio::test]
async fn test_thread_updates_only_when_changed() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    operator
        .set_live(vec![FeedItem::new("t3_x").with_title("AMA").with_score(1)])
        .await;

    let (mut monitor, handle, mut streams) = Monitor::new(operator.clone(), quiet_config());
    handle.monitor_threads(["t3_x"]).await;

    let first = monitor.poll_once().await;
    assert_eq!(first.updated_items, 1);
    let update = streams.post_updates.recv().await.expect("first snapshot");
    assert_eq!(update.score, 1);

    let second = monitor.poll_once().await;
    assert_eq!(second.updated_items, 0);
    assert!(streams.post_updates.try_recv().is_err());

    operator
        .set_live(vec![FeedItem::new("t3_x").with_title("AMA").with_score(42).with_num_comments(7)])
        .await;
    let third = monitor.poll_once().await;
    assert_eq!(third.updated_items, 1);
    let update = streams.post_updates.recv().await.expect("changed snapshot");
    assert_eq!(update.score, 42);
    assert_eq!(update.num_comments, 7);

    handle.unmonitor_threads(["t3_x"]).await;
    let resolves = operator.resolve_calls().await.len();
    monitor.poll_once().await;
    assert_eq!(operator.resolve_calls().await.len(), resolves);
    assert_eq!(handle.thread_query().await, "");
}

#[tokio::test]
async fn test_slow_consumer_does_not_block_loop() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    operator.push_scrape(posts(&["t3_c", "t3_b", "t3_a"])).await;
    operator.push_scrape(posts(&["t3_d"])).await;

    let config = MonitorConfig {
        channel_capacity: 1,
        ..quiet_config()
    };
    let (mut monitor, handle, mut streams) = Monitor::new(operator.clone(), config);
    handle.monitor_subreddits(["news"]).await;

    let report = monitor.poll_once().await;
    assert_eq!(report.new_items, 3);
    assert_eq!(monitor.tip().front(), "t3_c");

    assert_eq!(streams.new_posts.try_recv().ok().map(|p| p.name).as_deref(), Some("t3_a"));
    assert!(streams.new_posts.try_recv().is_err());

    monitor.poll_once().await;
    assert_eq!(streams.new_posts.try_recv().ok().map(|p| p.name).as_deref(), Some("t3_d"));
}

#[tokio::test]
async fn test_run_streams_posts_until_stopped() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    operator.push_scrape(posts(&["t3_b", "t3_a"])).await;
    operator.push_scrape(posts(&["t3_c"])).await;

    let (monitor, handle, streams) = Monitor::new(operator.clone(), quiet_config());
    handle.monitor_subreddits(["news"]).await;

    let worker = tokio::spawn(monitor.run());
    let (mut new_posts, _updates, _errors) = streams.into_streams();

    let mut names = Vec::new();
    while names.len() < 3 {
        let post = tokio::time::timeout(Duration::from_secs(5), new_posts.next())
            .await
            .expect("timed out waiting for posts")
            .expect("stream ended early");
        names.push(post.name);
    }
    assert_eq!(names, vec!["t3_a", "t3_b", "t3_c"]);

    handle.stop();
    assert!(handle.is_stopped());
    tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .expect("monitor did not stop")
        .expect("monitor task panicked");
}

#[tokio::test]
async fn test_control_calls_before_start_only_touch_registry() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    let (monitor, handle, _streams) = Monitor::new(operator.clone(), quiet_config());

    handle.monitor_subreddits(["news", "tech"]).await;
    handle.unmonitor_subreddits(["tech"]).await;
    handle.stop();

    tokio::time::timeout(Duration::from_secs(5), monitor.run())
        .await
        .expect("stopped monitor should return");

    assert_eq!(handle.subreddit_query().await, "news");
    assert!(operator.scrape_calls().await.is_empty());
}

#[tokio::test]
async fn test_nameless_posts_are_not_published() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    operator.push_scrape(posts(&["t3_b", "t3_a"])).await;
    operator.push_scrape(posts(&[""])).await;

    let (mut monitor, handle, mut streams) = Monitor::new(operator.clone(), quiet_config());
    handle.monitor_subreddits(["news"]).await;

    monitor.poll_once().await;
    let report = monitor.poll_once().await;

    assert_eq!(report.fetched, 1);
    assert_eq!(report.new_items, 0);
    assert_eq!(monitor.tip().front(), "t3_b");

    assert_eq!(streams.new_posts.recv().await.map(|p| p.name).as_deref(), Some("t3_a"));
    assert_eq!(streams.new_posts.recv().await.map(|p| p.name).as_deref(), Some("t3_b"));
    assert!(streams.new_posts.try_recv().is_err());
}

#[tokio::test]
async fn test_repair_error_reaches_sink_and_thread_watch_still_runs() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    operator.push_scrape(posts(&["t3_a"])).await;
    let mut watched = FeedItem::new("t3_watched");
    watched.score = 7;
    operator.set_live(vec![watched]).await;
    operator.fail_next_resolve("by_id timed out").await;

    let config = MonitorConfig {
        repair_every_cycles: 1,
        ..quiet_config()
    };
    let (mut monitor, handle, mut streams) = Monitor::new(operator.clone(), config);
    handle.monitor_subreddits(["news"]).await;
    handle.monitor_threads(["t3_watched"]).await;

    let report = monitor.poll_once().await;
    info!("Cycle with failed repair: {:?}", report);

    assert_eq!(
        report.states,
        vec![
            PollState::Fetching,
            PollState::Absorbing,
            PollState::Repairing,
            PollState::Publishing,
            PollState::Idle,
        ]
    );
    assert!(report.failed);
    assert_eq!(report.tip_status, None);
    assert_eq!(monitor.tip().ids(), vec!["t3_a"]);

    let error = streams.errors.recv().await.expect("error should be surfaced");
    assert!(error.to_string().contains("by_id timed out"));

    assert_eq!(
        operator.resolve_calls().await,
        vec![vec!["t3_a".to_string()], vec!["t3_watched".to_string()]]
    );
    assert_eq!(report.updated_items, 1);
    assert_eq!(streams.post_updates.recv().await.map(|p| p.score), Some(7));
}

#[tokio::test]
async fn test_thread_watch_error_reaches_sink_and_loop_continues() {
    init_tracing();

    let operator = Arc::new(MockOperator::new());
    operator.set_live(posts(&["t3_watched"])).await;
    operator.fail_next_resolve("by_id returned 502").await;

    let (mut monitor, handle, mut streams) = Monitor::new(operator.clone(), quiet_config());
    handle.monitor_threads(["t3_watched"]).await;

    let report = monitor.poll_once().await;

    assert!(report.failed);
    assert_eq!(report.updated_items, 0);
    assert_eq!(report.states, vec![PollState::Fetching, PollState::Publishing, PollState::Idle]);
    let error = streams.errors.recv().await.expect("error should be surfaced");
    assert!(error.to_string().contains("by_id returned 502"));

    let report = monitor.poll_once().await;
    assert!(!report.failed);
    assert_eq!(report.updated_items, 1);
    assert_eq!(
        streams.post_updates.recv().await.map(|p| p.name).as_deref(),
        Some("t3_watched")
    );
}
