use anyhow::Context;
use clap::Parser;
use feed_monitor::{FetchConfig, HttpOperator, Monitor, MonitorConfig};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "feed-monitor", about = "Stream new posts and thread updates from subreddits")]
struct Args {
    /// Subreddits to watch for new posts
    #[arg(long, value_delimiter = ',')]
    subreddits: Vec<String>,

    /// Thread fullnames (t3_...) to watch for updates
    #[arg(long, value_delimiter = ',')]
    threads: Vec<String>,

    /// Seconds between poll cycles
    #[arg(long, default_value_t = 30)]
    interval_secs: u64,

    #[arg(long, default_value = "https://www.reddit.com")]
    base_url: String,

    /// Overrides FEED_MONITOR_USER_AGENT
    #[arg(long)]
    user_agent: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut fetch_config = FetchConfig {
        base_url: args.base_url.clone(),
        ..FetchConfig::default()
    };
    if let Some(user_agent) = args
        .user_agent
        .clone()
        .or_else(|| env::var("FEED_MONITOR_USER_AGENT").ok())
    {
        fetch_config.user_agent = user_agent;
    }

    let operator = HttpOperator::new(fetch_config).context("failed to build HTTP operator")?;
    let config = MonitorConfig {
        poll_interval: Duration::from_secs(args.interval_secs.max(1)),
        ..MonitorConfig::default()
    };

    let (monitor, handle, mut streams) = Monitor::new(Arc::new(operator), config);
    handle.monitor_subreddits(args.subreddits).await;
    handle.monitor_threads(args.threads).await;

    info!(
        "Monitoring subreddits [{}] and threads [{}]",
        handle.subreddit_query().await,
        handle.thread_query().await
    );

    let worker = tokio::spawn(monitor.run());

    loop {
        tokio::select! {
            Some(post) = streams.new_posts.recv() => {
                info!("New post {} in {}: {}", post.name, post.subreddit.as_deref().unwrap_or("?"), post.title);
            }
            Some(post) = streams.post_updates.recv() => {
                info!("Updated {}: score {}, {} comments", post.name, post.score, post.num_comments);
            }
            Some(e) = streams.errors.recv() => {
                error!("Monitor error: {}", e);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping monitor");
                handle.stop();
                break;
            }
        }
    }

    worker.await.context("monitor task panicked")?;
    Ok(())
}
