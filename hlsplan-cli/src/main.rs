use std::time::Duration;

use clap::Parser;
use error::AppError;
use hlsplan_engine::manifest::track_label;
use hlsplan_engine::{
    FetchConfig, KeyOverride, ProxyConfig, ProxyType, RangeSpec, Resolver, ResolverConfig,
};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod cli;
mod error;
mod utils;

use cli::CliArgs;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&args.log_file)?;

    let multi_writer = MakeWriterExt::and(std::io::stdout, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!(
        "HTTP timeout configuration: overall={}s, connect={}s",
        args.timeout, args.connect_timeout
    );

    let fetch_config = build_fetch_config(&args)?;
    let resolver_config = build_resolver_config(&args)?;

    let resolver = Resolver::with_fetch_config(&fetch_config, resolver_config)?;
    info!(work_dir = %resolver.workspace().root().display(), "Working directory");
    let resolution = resolver.resolve().await?;
    let plan = &resolution.plan;

    info!(
        segments = plan.count,
        original = plan.original_count,
        parts = plan.parts.len(),
        vod = plan.is_vod,
        duration = plan.total_duration,
        redirects = resolution.depth,
        meta = %resolution.meta_path.display(),
        "Segment plan written"
    );

    if let Some(audio) = plan.audio_url.as_deref() {
        info!(url = %audio, "External audio track");
    }
    if let Some(subtitle) = plan.subtitle_url.as_deref() {
        info!(url = %subtitle, "External subtitle track");
    }
    if let Some(master) = resolution.master.as_ref() {
        debug!(
            variants = master.play_lists.len(),
            "Master playlist listing written"
        );
    }
    if resolution.requires_binary_fallback {
        warn!("Playlist uses an unsupported encryption method, an external downloader is required");
    }
    for (kind, tracks) in [
        ("audio", &resolution.pending_audio_choice),
        ("subtitle", &resolution.pending_subtitle_choice),
    ] {
        if tracks.is_empty() {
            continue;
        }
        let labels: Vec<String> = tracks.iter().map(track_label).collect();
        warn!(kind, choices = ?labels, "Several tracks available, none selected");
    }

    Ok(())
}

fn build_fetch_config(args: &CliArgs) -> Result<FetchConfig, AppError> {
    let mut builder = FetchConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout));

    if args.no_proxy {
        info!("All proxy settings disabled (--no-proxy flag)");
        builder = builder.with_system_proxy(false);
    } else if let Some(proxy_url) = args.proxy.as_ref() {
        let proxy_type: ProxyType = args
            .proxy_type
            .parse()
            .map_err(AppError::InvalidInput)?;

        let mut proxy = ProxyConfig::new(proxy_url.clone(), proxy_type);
        if let (Some(username), Some(password)) = (&args.proxy_user, &args.proxy_pass) {
            proxy = proxy.with_auth(username.clone(), password.clone());
        }

        info!(
            proxy_url = %proxy_url,
            proxy_type = ?proxy_type,
            has_auth = proxy.auth.is_some(),
            "Using explicit proxy configuration"
        );
        builder = builder.with_proxy(proxy);
    } else {
        info!("Using system proxy settings");
        builder = builder.with_system_proxy(true);
    }

    Ok(builder.build())
}

fn build_resolver_config(args: &CliArgs) -> Result<ResolverConfig, AppError> {
    let range = args.range.as_deref().and_then(RangeSpec::parse);

    let key_override = match (&args.key_file, &args.key_base64) {
        (Some(_), Some(_)) => {
            return Err(AppError::InvalidInput(
                "--key-file and --key-base64 are mutually exclusive".to_string(),
            ));
        }
        (Some(file), None) => Some(KeyOverride::File(file.clone())),
        (None, Some(key)) => Some(KeyOverride::Base64(key.clone())),
        (None, None) => None,
    };

    if args.key_iv.is_some() && key_override.is_none() {
        warn!("--key-iv has no effect without --key-file or --key-base64");
    }

    // A user supplied range keeps advertisement segments in place.
    let remove_ads = !args.keep_ads && range.is_none();

    let mut builder = ResolverConfig::builder(args.url.clone())
        .with_headers(utils::parse_headers(&args.headers))
        .with_work_dir(args.work_dir.clone())
        .with_range(range)
        .with_audio_only(args.audio_only)
        .with_ad_removal(remove_ads)
        .with_max_redirect_depth(args.max_redirects)
        .with_manifest_timeout(Duration::from_secs(args.timeout))
        .with_key_timeout(Duration::from_secs(args.timeout));

    if let Some(base_url) = args.base_url.as_ref() {
        builder = builder.with_base_url(base_url.clone());
    }
    if let Some(key) = key_override {
        builder = builder.with_key_override(key);
    }
    if let Some(iv) = args.key_iv.as_ref() {
        builder = builder.with_iv_override(iv.clone());
    }

    Ok(builder.build()?)
}
