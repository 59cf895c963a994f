use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use intent_scanner::analysis::{
    scoring, AnalysisResult, ChatModel, Classifier, DraftContext, OpenRouterClient, Pipeline,
};
use intent_scanner::config::AppConfig;
use intent_scanner::quota::QuotaCounter;
use intent_scanner::resolver::{parse_input, ParsedInput};
use intent_scanner::web::state::{AppState, SharedPipeline};
use intent_scanner::web;
use intent_scanner::youtube::{ChannelLookup, VideoInfo, VideoPlatform, YouTubeClient};
use intent_scanner::ScanError;

#[derive(Parser)]
#[command(name = "intent-scanner", version, about = "Scores YouTube comments for patient booking intent")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the JSON API
    Serve,
    /// Analyze a video, or list a channel's videos
    Scan(ScanArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// Video or channel URL, @handle, channel id or video id
    input: String,

    /// Also draft a pinned comment for the video
    #[arg(long)]
    draft: bool,

    /// Print JSON instead of a text report
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intent_scanner=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("Loading configuration from {}", cli.config.display());
    let config = AppConfig::load(&cli.config)?;

    let quota = QuotaCounter::new();
    let openrouter = Arc::new(OpenRouterClient::new(&config.llm));
    let pipeline = build_pipeline(&config, quota.clone(), openrouter.clone());

    match cli.command {
        Command::Serve => serve(&config, pipeline, openrouter, quota).await,
        Command::Scan(args) => {
            let outcome = scan(&pipeline, &config, &args).await;
            info!("YouTube quota used: {} units", quota.used());
            if let Err(e) = outcome {
                error!("Scan failed: {:#}", e);
                let code = e
                    .downcast_ref::<ScanError>()
                    .map(ScanError::exit_code)
                    .unwrap_or(1);
                match e.downcast_ref::<ScanError>() {
                    Some(scan_error) => eprintln!("error: {}", scan_error.user_message()),
                    None => eprintln!("error: {:#}", e),
                }
                std::process::exit(code);
            }
            Ok(())
        }
    }
}

fn build_pipeline(
    config: &AppConfig,
    quota: QuotaCounter,
    openrouter: Arc<OpenRouterClient>,
) -> SharedPipeline {
    let platform: Arc<dyn VideoPlatform> = Arc::new(YouTubeClient::new(&config.youtube, quota));
    let model: Arc<dyn ChatModel> = openrouter;
    let classifier = Classifier::new(model, &config.llm);
    Pipeline::new(platform, classifier, config.youtube.comments_per_order)
}

async fn serve(
    config: &AppConfig,
    pipeline: SharedPipeline,
    openrouter: Arc<OpenRouterClient>,
    quota: QuotaCounter,
) -> Result<()> {
    if config.youtube.api_key.is_none() {
        tracing::warn!("YOUTUBE_API_KEY is not set; YouTube requests will fail");
    }
    if config.llm.api_key.is_none() {
        tracing::warn!("OPENROUTER_API_KEY is not set; classification will fail");
    }

    let app_state = AppState::new(pipeline, openrouter, quota, config.youtube.max_videos);
    let router = web::create_router(app_state, config.web.static_dir.as_deref());

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Starting web server at http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down");
            }
        })
        .await
        .context("Web server error")?;

    Ok(())
}

async fn scan(pipeline: &SharedPipeline, config: &AppConfig, args: &ScanArgs) -> Result<()> {
    let parsed = parse_input(&args.input);
    let platform = pipeline.platform();

    let video_id = match &parsed {
        ParsedInput::VideoId(id) => id.clone(),
        ParsedInput::Unknown(raw) => return Err(ScanError::UnrecognizedInput(raw.clone()).into()),
        other => {
            let (lookup, value) = ChannelLookup::from_parsed(other)
                .ok_or_else(|| ScanError::UnrecognizedInput(args.input.clone()))?;
            let channel = platform.resolve_channel(lookup, value).await?;
            let videos = platform
                .fetch_channel_videos(&channel.uploads_playlist_id, config.youtube.max_videos)
                .await?;

            if args.json {
                let report = serde_json::json!({ "channel": channel, "videos": videos });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} ({} subscribers, {} videos)",
                    channel.title, channel.subscriber_count, channel.video_count
                );
                for video in &videos {
                    println!(
                        "  {}  {:>10} views  {:>6} comments  {}",
                        video.video_id, video.view_count, video.comment_count, video.title
                    );
                }
                println!("\nRun `intent-scanner scan <VIDEO_ID>` to analyze one of them.");
            }
            return Ok(());
        }
    };

    let video = platform.fetch_video(&video_id).await?;
    info!("Analyzing \"{}\" ({} views)", video.title, video.view_count);
    let result = pipeline.analyze(&video.video_id, video.view_count, &()).await?;

    let draft = if args.draft {
        let context = DraftContext::from_analysis(&video.channel_title, &video.title, &result);
        Some(pipeline.classifier().draft_pinned_comment(&context).await?)
    } else {
        None
    };

    if args.json {
        let report = serde_json::json!({
            "video": video,
            "result": result,
            "score_level": scoring::score_level(result.raw_score),
            "pinned_comment": draft,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&video, &result, draft.as_deref());
    }

    Ok(())
}

fn print_report(video: &VideoInfo, result: &AnalysisResult, draft: Option<&str>) {
    let level = scoring::score_level(result.raw_score);
    let debug = &result.debug;

    println!("{} | {}", video.channel_title, video.title);
    println!(
        "Comments: {} unique ({} by relevance, {} by time, {} chars), classified in {} ms",
        debug.unique_count,
        debug.relevance_count,
        debug.time_count,
        debug.total_characters,
        debug.analysis_time_ms
    );
    println!(
        "Conversion score: {} ({:?}), density {:.2} per 1k views",
        result.raw_score, level, result.density_score
    );
    println!("Average intent: {:.1}", result.average_intent_score);
    println!(
        "Freshness: {:?} ({} in 7 days, {} in 30 days)",
        result.freshness.badge,
        result.freshness.comments_last_7_days,
        result.freshness.comments_last_30_days
    );

    println!("Categories:");
    for (category, count) in result.category_counts.iter() {
        println!("  {:<20} {}", category.label(), count);
    }

    if !result.geo_places.is_empty() {
        let places: Vec<String> = result
            .geo_places
            .iter()
            .map(|g| format!("{} ({})", g.location, g.count))
            .collect();
        println!("Places: {}", places.join(", "));
    }

    if let Some(draft) = draft {
        println!("\nPinned comment draft:\n{}", draft);
    }
}
