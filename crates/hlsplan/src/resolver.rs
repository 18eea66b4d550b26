//! One resolution job from source URL to `meta.json`.
//!
//! A job runs as a bounded loop of passes. Each pass fetches one manifest,
//! scans it with a fresh [`ResolutionSession`], and either finishes with a
//! plan or redirects to another manifest: the best variant of a master
//! playlist, or the external audio track in audio-only mode.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::config::{FetchConfig, ResolverConfig};
use crate::error::ResolveError;
use crate::fetch::{HttpFetcher, UriFetcher};
use crate::manifest::{KeyResolver, MediaTrack, ResolutionSession, ScanContext, ScanOutcome};
use crate::plan::{MasterListing, Plan, emit_master, emit_plan, select_tracks, trim, update_time};
use crate::url_utils::base_of;
use crate::workspace::{RAW_MANIFEST, Workspace};

static BASE_URL_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#YUMING\|(.*)").unwrap());

/// Result of a completed job
#[derive(Debug, Clone)]
pub struct Resolution {
    pub plan: Plan,
    /// Present when the job went through a master playlist
    pub master: Option<MasterListing>,
    /// An unsupported encryption method was seen; segments must be merged as raw bytes
    pub requires_binary_fallback: bool,
    pub program_date_time: Option<String>,
    /// Audio tracks left for the caller to choose from
    pub pending_audio_choice: Vec<MediaTrack>,
    pub pending_subtitle_choice: Vec<MediaTrack>,
    /// Redirections followed before the plan was produced
    pub depth: usize,
    pub meta_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Source,
    Variant,
    Audio,
}

#[derive(Debug, Clone)]
struct PassTarget {
    url: String,
    base_url: Option<String>,
    kind: PassKind,
}

/// State handed from one pass to the next
#[derive(Debug, Default)]
struct Carried {
    audio_url: Option<String>,
    subtitle_url: Option<String>,
    audio_choices: Vec<MediaTrack>,
    subtitle_choices: Vec<MediaTrack>,
    master: Option<MasterListing>,
    requires_binary_fallback: bool,
}

enum PassOutcome {
    Redirect(PassTarget),
    Done(Box<Resolution>),
}

pub struct Resolver {
    fetcher: Arc<dyn UriFetcher>,
    config: ResolverConfig,
    workspace: Workspace,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn UriFetcher>, config: ResolverConfig) -> Self {
        let workspace = Workspace::new(config.work_dir.clone());
        Self {
            fetcher,
            config,
            workspace,
        }
    }

    /// Resolver backed by an [`HttpFetcher`] built from `fetch_config`
    pub fn with_fetch_config(
        fetch_config: &FetchConfig,
        config: ResolverConfig,
    ) -> Result<Self, ResolveError> {
        let fetcher = HttpFetcher::new(fetch_config)
            .map_err(|e| ResolveError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::new(Arc::new(fetcher), config))
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub async fn resolve(&self) -> Result<Resolution, ResolveError> {
        let mut target = PassTarget {
            url: self.config.source_url.clone(),
            base_url: self.config.base_url.clone(),
            kind: PassKind::Source,
        };
        let mut carried = Carried::default();
        let mut depth = 0;

        loop {
            match self.run_pass(&target, &mut carried).await? {
                PassOutcome::Done(mut resolution) => {
                    resolution.depth = depth;
                    return Ok(*resolution);
                }
                PassOutcome::Redirect(next) => {
                    depth += 1;
                    if depth > self.config.max_redirect_depth {
                        error!(url = %next.url, depth, "Redirect limit reached");
                        return Err(ResolveError::invalid(
                            next.url,
                            format!(
                                "more than {} playlist redirections",
                                self.config.max_redirect_depth
                            ),
                        ));
                    }
                    target = next;
                }
            }
        }
    }

    async fn run_pass(
        &self,
        target: &PassTarget,
        carried: &mut Carried,
    ) -> Result<PassOutcome, ResolveError> {
        let config = &self.config;
        let source_url = config.rules.rewrite_source(&target.url);
        info!(url = %source_url, kind = ?target.kind, "Resolving manifest");

        self.workspace.ensure().await?;
        let body = self
            .fetcher
            .fetch(&source_url, &config.headers, config.manifest_timeout)
            .await
            .map_err(|e| ResolveError::fetch(source_url.as_str(), e))?;
        let content = String::from_utf8_lossy(&body);
        if content.trim().is_empty() {
            return Err(ResolveError::invalid(source_url, "empty manifest"));
        }

        self.workspace.write(RAW_MANIFEST, content.as_bytes()).await?;
        if content.contains("<MPD") {
            return Err(ResolveError::invalid(
                source_url,
                "DASH manifests are not supported",
            ));
        }

        let base_url = self.base_url_for(target, &source_url, &content).await?;
        debug!(base_url = %base_url, "Base URL");

        let mut keys = KeyResolver::new(
            self.fetcher.as_ref(),
            &config.headers,
            config.key_timeout,
            &config.rules,
        );
        if let Some(key) = &config.key_override {
            keys.apply_override(key, config.iv_override.as_deref()).await?;
        }

        let ctx = ScanContext {
            source_url: &source_url,
            base_url: &base_url,
            remove_ads: config.remove_ads,
            rules: &config.rules,
        };
        let mut outcome = ResolutionSession::new(ctx, keys).scan(&content).await?;
        if config.rules.forces_vod(&source_url) {
            outcome.is_vod = true;
        }
        carried.requires_binary_fallback |= outcome.requires_binary_fallback;

        if outcome.is_master() {
            return self.redirect_to_variant(source_url, outcome, carried).await;
        }

        if config.audio_only && target.kind != PassKind::Audio {
            if let Some(audio_url) = carried.audio_url.take() {
                info!(url = %audio_url, "Audio only: resolving the external audio track instead");
                self.workspace.clear().await?;
                return Ok(PassOutcome::Redirect(PassTarget {
                    url: audio_url,
                    base_url: None,
                    kind: PassKind::Audio,
                }));
            }
            warn!("Audio only requested but the stream has no external audio track");
        }

        Ok(PassOutcome::Done(Box::new(
            self.finish(source_url, base_url, outcome, carried).await?,
        )))
    }

    async fn base_url_for(
        &self,
        target: &PassTarget,
        source_url: &str,
        content: &str,
    ) -> Result<String, ResolveError> {
        if let Some(base_url) = target.base_url.as_deref().filter(|b| !b.is_empty()) {
            return Ok(base_url.to_string());
        }
        if let Some(caps) = BASE_URL_DIRECTIVE.captures(content) {
            return Ok(caps[1].trim().to_string());
        }
        let final_url = self
            .fetcher
            .resolve_final_url(source_url, &self.config.headers)
            .await
            .map_err(|e| ResolveError::fetch(source_url, e))?;
        Ok(base_of(&final_url))
    }

    async fn redirect_to_variant(
        &self,
        source_url: String,
        outcome: ScanOutcome,
        carried: &mut Carried,
    ) -> Result<PassOutcome, ResolveError> {
        let Some(best) = outcome.best_variant else {
            return Err(ResolveError::invalid(source_url, "master playlist without variants"));
        };

        let selection = select_tracks(&best, &outcome.audio_groups, &outcome.subtitle_groups);
        let listing = MasterListing::new(
            source_url,
            &outcome.variants,
            outcome.audio_groups,
            outcome.subtitle_groups,
        )?;
        emit_master(&self.workspace, &listing).await?;
        info!(url = %best.url, bandwidth = best.bandwidth, "Selected variant");

        carried.audio_url = selection.audio_url;
        carried.subtitle_url = selection.subtitle_url;
        carried.audio_choices = selection.audio_choices;
        carried.subtitle_choices = selection.subtitle_choices;
        carried.master = Some(listing);

        Ok(PassOutcome::Redirect(PassTarget {
            url: best.url,
            base_url: None,
            kind: PassKind::Variant,
        }))
    }

    async fn finish(
        &self,
        source_url: String,
        base_url: String,
        outcome: ScanOutcome,
        carried: &mut Carried,
    ) -> Result<Resolution, ResolveError> {
        let original_count = outcome.segment_count() as i64;
        let trimmed = trim(
            outcome.parts,
            self.config.range.as_ref(),
            outcome.total_duration,
        );
        if trimmed.count != original_count {
            info!(kept = trimmed.count, of = original_count, "Range applied");
        }

        let plan = Plan {
            source_url,
            base_url,
            update_time: update_time(),
            original_count,
            count: trimmed.count,
            is_vod: outcome.is_vod,
            target_duration: outcome.target_duration,
            total_duration: trimmed.total_duration,
            audio_url: carried.audio_url.take(),
            subtitle_url: carried.subtitle_url.take(),
            init_segment: outcome.init_segment,
            parts: trimmed.parts,
        };
        let meta_path = emit_plan(&self.workspace, &plan).await?;

        Ok(Resolution {
            plan,
            master: carried.master.take(),
            requires_binary_fallback: carried.requires_binary_fallback,
            program_date_time: outcome.program_date_time,
            pending_audio_choice: std::mem::take(&mut carried.audio_choices),
            pending_subtitle_choice: std::mem::take(&mut carried.subtitle_choices),
            depth: 0,
            meta_path,
        })
    }
}
