use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use tubetest_tracker::alerts::AlertStore;
use tubetest_tracker::analytics::AnalyticsStore;
use tubetest_tracker::config::Config;
use tubetest_tracker::config_store;
use tubetest_tracker::db::Database;
use tubetest_tracker::error::{Result, TrackerError};
use tubetest_tracker::sync::SyncService;
use tubetest_tracker::tracking::{TrackingPeriod, ViewTracker};
use tubetest_tracker::videos::{NewVideoInput, VideoStore};
use tubetest_tracker::youtube::YouTubeClient;

#[derive(Parser, Debug)]
#[command(name = "tubetest")]
#[command(about = "TubeTest Tracker CLI")]
struct Cli {
    #[arg(long, env = "TUBETEST_DB", default_value = "./data/tubetest.db")]
    db: String,

    #[arg(long, env = "TUBETEST_USER", default_value = "local")]
    user_id: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Creates the acting user, optionally linked to a YouTube channel.
    AddUser {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        channel: Option<String>,
    },
    AddVideo {
        #[arg(long)]
        youtube_id: String,

        #[arg(long)]
        title: String,
    },
    Videos,
    Snapshot,
    Trends {
        #[arg(long, default_value = "24h")]
        period: TrackingPeriod,
    },
    Rankings {
        #[arg(long, default_value = "24h")]
        period: TrackingPeriod,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    CheckAlerts {
        #[arg(long, default_value = "24h")]
        period: TrackingPeriod,
    },
    /// Pulls uploads and counters from YouTube for every user.
    Sync,
    Analytics {
        #[arg(long, default_value_t = 28)]
        days: u32,
    },
    /// Prints stored daily analytics for one video, newest day first.
    VideoAnalytics {
        #[arg(long)]
        video_id: i32,

        #[arg(long, default_value_t = 28)]
        limit: usize,
    },
    ConfigImport {
        #[arg(long)]
        path: String,
    },
    ConfigShow,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,tubetest_tracker=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::ConfigImport { path } => {
            let config = Config::from_file(path)?;
            config_store::save_config(&cli.db, &config)?;
            println!("Config imported into {}", cli.db);
            return Ok(());
        }
        Commands::ConfigShow => {
            let config = Config::from_store(&cli.db)?;
            print_json(&redacted_config_value(&config)?)?;
            return Ok(());
        }
        _ => {}
    }

    let db = Database::open(&cli.db).await?;
    let user_id = cli.user_id.as_str();
    match cli.command {
        Commands::AddUser { name, channel } => {
            let name = name.unwrap_or_else(|| user_id.to_string());
            let user = VideoStore::new(db)
                .ensure_user(user_id, &name, channel.as_deref())
                .await?;
            print_json(&user)
        }
        Commands::AddVideo { youtube_id, title } => {
            let videos = VideoStore::new(db);
            videos.ensure_user(user_id, user_id, None).await?;
            let input = NewVideoInput {
                youtube_id,
                title,
                description: None,
                thumbnail_url: None,
                published_at: None,
            };
            print_json(&videos.create_video(user_id, &input).await?)
        }
        Commands::Videos => print_json(&VideoStore::new(db).list_videos(user_id).await?),
        Commands::Snapshot => {
            print_json(&ViewTracker::new(db).record_snapshots(user_id).await?)
        }
        Commands::Trends { period } => {
            print_json(&ViewTracker::new(db).trends(user_id, period).await?)
        }
        Commands::Rankings { period, limit } => {
            print_json(&ViewTracker::new(db).rankings(user_id, period, limit).await?)
        }
        Commands::CheckAlerts { period } => {
            print_json(&AlertStore::new(db).check_alerts(user_id, period).await?)
        }
        Commands::Sync => {
            let sync = youtube_sync(&cli.db, db)?;
            print_json(&sync.sync_all().await?)
        }
        Commands::Analytics { days } => {
            let sync = youtube_sync(&cli.db, db)?;
            print_json(&sync.sync_analytics_all(days).await?)
        }
        Commands::VideoAnalytics { video_id, limit } => {
            let video = VideoStore::new(db.clone())
                .get_video(user_id, video_id)
                .await?
                .ok_or_else(|| TrackerError::NotFound(format!("video {video_id}")))?;
            print_json(&AnalyticsStore::new(db).list_for_video(video.id, limit).await?)
        }
        Commands::ConfigImport { .. } | Commands::ConfigShow => Ok(()),
    }
}

fn youtube_sync(db_path: &str, db: Database) -> Result<SyncService> {
    let config = Config::from_store(db_path)?;
    let youtube = config
        .youtube
        .as_ref()
        .ok_or_else(|| TrackerError::Config("youtube section is missing".to_string()))?;
    let client = YouTubeClient::new(youtube)?;
    Ok(SyncService::new(db, Arc::new(client)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| TrackerError::Serialization(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}

fn redacted_config_value(config: &Config) -> Result<serde_json::Value> {
    let mut value =
        serde_json::to_value(config).map_err(|e| TrackerError::Config(e.to_string()))?;
    for section in ["openai", "youtube"] {
        if let Some(obj) = value.get_mut(section).and_then(|v| v.as_object_mut()) {
            obj.remove("api_key");
            obj.remove("access_token");
        }
    }
    Ok(value)
}
