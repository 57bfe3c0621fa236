use std::io::Read;
use std::sync::Arc;

use anyhow::Context;

use posture_core::intake::{IntakeAnswers, IntakeRecommender};
use posture_core::keypool::crypto::SecretCipher;
use posture_core::keypool::KeyPool;
use posture_core::metrics::{MetricsService, Pricing};
use posture_core::model::{AssessmentStructure, RawResponse};
use posture_core::pipeline::Orchestrator;
use posture_core::providers::llm::OpenAiClient;
use posture_core::{OrchestratorConfig, Store};

use crate::args::{CacheCommand, Cli, Command, KeysCommand, MetricsCommand};

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = OrchestratorConfig::from_env();
    let store = Store::open(&cli.db)?;
    store.init_schema()?;

    match cli.command {
        Command::Keys { command } => keys(command, &store, &config).await,
        Command::Generate(args) => generate(args, &store, &config).await,
        Command::Intake(args) => intake(args, &store, &config).await,
        Command::Metrics { command } => metrics(command, &store, &config),
        Command::Cache { command } => cache(command, &store),
        Command::Diagnose => diagnose(&store, &config),
    }
}

fn pool(store: &Store, config: &OrchestratorConfig) -> anyhow::Result<Arc<KeyPool>> {
    let cipher = SecretCipher::load(config)?;
    Ok(Arc::new(KeyPool::new(
        store.clone(),
        cipher,
        config.per_key_rps,
    )))
}

async fn keys(
    command: KeysCommand,
    store: &Store,
    config: &OrchestratorConfig,
) -> anyhow::Result<()> {
    match command {
        KeysCommand::GenerateEncryptionKey => {
            println!("{}", SecretCipher::generate_key_b64());
            return Ok(());
        }
        _ => {}
    }

    let pool = pool(store, config)?;
    match command {
        KeysCommand::Add {
            label,
            secret,
            actor,
        } => {
            let secret = match secret {
                Some(s) => s,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf.trim().to_string()
                }
            };
            anyhow::ensure!(!secret.is_empty(), "secret must not be empty");
            let info = pool.add(&label, &secret, &actor)?;
            println!("added {} ({})", info.label, info.masked_key);
        }
        KeysCommand::List { include_inactive } => {
            let listed = pool.list(include_inactive)?;
            println!("{}", serde_json::to_string_pretty(&listed)?);
        }
        KeysCommand::Toggle { id, active } => {
            anyhow::ensure!(pool.toggle(&id, active)?, "key not found: {id}");
            println!("key {id} active={active}");
        }
        KeysCommand::Delete { id } => {
            anyhow::ensure!(pool.delete(&id)?, "key not found: {id}");
            println!("deleted {id}");
        }
        KeysCommand::Test { secret } => {
            let client = OpenAiClient::new(config.request_timeout);
            let (valid, message) = pool.test_secret(&client, &config.model, &secret).await;
            println!("{message}");
            if !valid {
                std::process::exit(1);
            }
        }
        KeysCommand::GenerateEncryptionKey => unreachable!("handled above"),
    }
    Ok(())
}

async fn generate(
    args: crate::args::GenerateArgs,
    store: &Store,
    config: &OrchestratorConfig,
) -> anyhow::Result<()> {
    let structure: AssessmentStructure = read_json(&args.structure)
        .with_context(|| format!("reading structure {}", args.structure.display()))?;
    let responses: Vec<RawResponse> = read_json(&args.responses)
        .with_context(|| format!("reading responses {}", args.responses.display()))?;

    let structure = if args.sections.is_empty() {
        structure
    } else {
        structure.filter_by_sections(&args.sections)
    };

    let pool = pool(store, config)?;
    let client = Arc::new(OpenAiClient::new(config.request_timeout));
    let orchestrator = Orchestrator::new(store.clone(), pool, client, config.clone())?;

    let insights = orchestrator
        .generate_report(&args.report_id, &structure, &responses)
        .await?;

    println!(
        "report {}: {} sections ({} degraded, {} cached), synthesis degraded={}",
        insights.report_id,
        insights.sections.len(),
        insights.sections.values().filter(|s| s.degraded).count(),
        insights.sections.values().filter(|s| s.from_cache).count(),
        insights.synthesis_degraded,
    );
    Ok(())
}

async fn intake(
    args: crate::args::IntakeArgs,
    store: &Store,
    config: &OrchestratorConfig,
) -> anyhow::Result<()> {
    let answers: IntakeAnswers = read_json(&args.answers)
        .with_context(|| format!("reading answers {}", args.answers.display()))?;

    let pool = pool(store, config)?;
    let client = Arc::new(OpenAiClient::new(config.request_timeout));
    let recommender = IntakeRecommender::new(store.clone(), pool, client, config.clone());

    let outcome = recommender
        .recommend(&answers, args.user_id.as_deref())
        .await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn metrics(
    command: MetricsCommand,
    store: &Store,
    config: &OrchestratorConfig,
) -> anyhow::Result<()> {
    let pricing = Pricing::with_override(config.pricing_override.as_deref())?;
    let svc = MetricsService::new(store.clone(), pricing);
    match command {
        MetricsCommand::Rollup { date } => {
            let rollup = svc.rollup_daily(date.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&rollup)?);
        }
        MetricsCommand::ReportCost { report_id } => {
            let cost = svc.report_cost(&report_id)?;
            println!("{}", serde_json::to_string_pretty(&cost)?);
        }
    }
    Ok(())
}

fn cache(command: CacheCommand, store: &Store) -> anyhow::Result<()> {
    match command {
        CacheCommand::Prune { prompt_version } => {
            let pruned = store.prune_cache_by_prompt_version(&prompt_version)?;
            println!("pruned {pruned} cache entries for prompt version {prompt_version}");
        }
    }
    Ok(())
}

fn diagnose(store: &Store, config: &OrchestratorConfig) -> anyhow::Result<()> {
    let pool = pool(store, config)?;
    pool.diagnostics()?;
    let active = pool.list(false)?.len();
    println!("encryption key: ok");
    println!("active credentials: {active}");
    println!("model: {} (fallback {})", config.model, config.fallback_model);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
