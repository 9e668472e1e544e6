use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::Gemini;
use browserless_client::BrowserlessClient;
use tenposcan_common::{CompanyTarget, Config};
use tenposcan_scout::cache::ResponseCache;
use tenposcan_scout::inference::GeminiInference;
use tenposcan_scout::{Investigator, RenderedFetcher, StaticFetcher};

/// Extract store/branch listings for one company or a batch.
#[derive(Parser, Debug)]
#[command(name = "tenposcan-scout")]
struct Args {
    /// Company name to investigate.
    #[arg(long)]
    company: Option<String>,

    /// Store-locator seed URL.
    #[arg(long)]
    url: Option<String>,

    /// Industry hint passed to the inference tier.
    #[arg(long)]
    industry: Option<String>,

    /// JSON file holding an array of targets
    /// (`[{"name": "...", "seed_url": "...", "industry": "..."}]`).
    #[arg(long)]
    batch: Option<PathBuf>,

    /// Write results as JSON lines here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Override the acceptance threshold.
    #[arg(long)]
    threshold: Option<f32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    let threshold = args.threshold.unwrap_or(config.acceptance_threshold);

    let targets = load_targets(&args)?;
    if targets.is_empty() {
        bail!("no targets: pass --company or --batch");
    }

    let gemini = Gemini::new(&config.gemini_api_key, &config.gemini_model);
    let cache = Arc::new(ResponseCache::default());
    let inference = Arc::new(GeminiInference::new(
        gemini,
        Arc::clone(&cache),
        Duration::from_secs(config.cache_ttl_secs),
        threshold,
    ));

    let mut investigator = Investigator::new(Arc::new(StaticFetcher::new()))
        .with_inference(inference)
        .with_threshold(threshold)
        .with_request_delay(Duration::from_millis(config.request_delay_ms));
    if let Some(ref url) = config.browserless_url {
        let client = BrowserlessClient::new(url, config.browserless_token.as_deref());
        investigator = investigator.with_rendered(Arc::new(RenderedFetcher::new(client)));
    } else {
        info!("BROWSERLESS_URL not set, rendered tier disabled");
    }

    let results = Arc::new(investigator).investigate_batch(targets).await;

    let mut out: Box<dyn Write> = match args.output {
        Some(ref path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut stores = 0usize;
    let mut failures = 0usize;
    for result in &results {
        stores += result.records.len();
        if result.records.is_empty() {
            failures += 1;
        }
        writeln!(out, "{}", serde_json::to_string(result)?)?;
    }
    out.flush()?;

    let cache_stats = cache.stats().await;
    info!(
        companies = results.len(),
        stores,
        failures,
        inference_cache_hit_rate = cache_stats.hit_rate(),
        "run complete"
    );
    Ok(())
}

fn load_targets(args: &Args) -> anyhow::Result<Vec<CompanyTarget>> {
    if let Some(ref path) = args.batch {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let targets: Vec<CompanyTarget> =
            serde_json::from_reader(file).context("parsing batch file")?;
        return Ok(targets);
    }
    let Some(ref company) = args.company else {
        return Ok(Vec::new());
    };
    let mut target = CompanyTarget::new(company.clone());
    if let Some(ref url) = args.url {
        target = target.with_seed_url(url.clone());
    }
    if let Some(ref industry) = args.industry {
        target = target.with_industry(industry.clone());
    }
    Ok(vec![target])
}
