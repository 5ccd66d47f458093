use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use lead_campaign::cli::{Cli, Command};
use lead_campaign::config::CampaignConfig;
use lead_campaign::llm::{LlmProvider, create_provider};
use lead_campaign::pipeline::{
    CampaignDeps, CampaignOutcome, CampaignPaths, LogProgress, RecordStage, Sequencer, StdinGate,
    run_stage,
};
use lead_campaign::report::{LlmReportAuthor, generate_report};
use lead_campaign::stages::{
    EmailDrafter, LeadScorer, OutreachDispatcher, RandomReplies, ReplyClassifier, ReplySimulator,
};
use lead_campaign::transport::SmtpMailer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let cli = Cli::parse();
    let config = CampaignConfig::from_env().context("loading configuration")?;
    let _log_guard = init_tracing(&config.base_dir.join("logs"));

    let paths = CampaignPaths::new(&config.base_dir);
    let llm = || -> anyhow::Result<Arc<dyn LlmProvider>> { Ok(create_provider(&config.llm()?)?) };

    match &cli.command {
        Command::Run => {
            let llm = llm()?;
            eprintln!("📣 Lead Campaign v{}", env!("CARGO_PKG_VERSION"));
            eprintln!("   Model: {}", llm.model_name());
            eprintln!("   SMTP: {}:{}", config.smtp.host, config.smtp.port);
            eprintln!("   Base dir: {}\n", config.base_dir.display());

            let deps = CampaignDeps {
                llm: Arc::clone(&llm),
                transport: Arc::new(SmtpMailer::new(config.smtp.clone())),
                replies: Arc::new(RandomReplies),
                author: Arc::new(LlmReportAuthor::new(llm)),
                sender: config.smtp.sender.clone(),
            };
            match Sequencer::new(paths, deps).run(&StdinGate).await? {
                CampaignOutcome::Completed { report, metrics } => {
                    eprintln!("\n🎉 Campaign completed.");
                    eprintln!(
                        "   Sent: {} | Replies: {} | Response rate: {}%",
                        metrics.emails_successful, metrics.replies_received, metrics.response_rate
                    );
                    eprintln!("   Report: {}", report.display());
                }
                CampaignOutcome::Paused => {
                    eprintln!("\n⏸️  Campaign paused after outreach.");
                    eprintln!("   Run the follow-up stages once replies arrive.");
                }
            }
        }
        Command::Score(args) => {
            let (input, output) = args.resolve(&paths.leads, &paths.analyzed);
            standalone(&LeadScorer::new(llm()?), &input, &output).await?;
        }
        Command::Draft(args) => {
            let (input, output) = args.resolve(&paths.analyzed, &paths.drafted);
            standalone(&EmailDrafter::new(llm()?), &input, &output).await?;
        }
        Command::Send(args) => {
            let (input, output) = args.resolve(&paths.drafted, &paths.sent);
            let transport = Arc::new(SmtpMailer::new(config.smtp.clone()));
            standalone(&OutreachDispatcher::new(transport), &input, &output).await?;
        }
        Command::SimulateReplies(args) => {
            let (input, output) = args.resolve(&paths.sent, &paths.replied);
            let stage = ReplySimulator::new(llm()?, Arc::new(RandomReplies));
            standalone(&stage, &input, &output).await?;
        }
        Command::Classify(args) => {
            let (input, output) = args.resolve(&paths.replied, &paths.classified);
            standalone(&ReplyClassifier::new(llm()?), &input, &output).await?;
        }
        Command::Report(args) => {
            let (input, output) = args.resolve(&paths.classified, &paths.report);
            let author = LlmReportAuthor::new(llm()?);
            let metrics = generate_report(&input, &output, &author).await?;
            eprintln!(
                "✅ Report written to {} ({} contacts)",
                output.display(),
                metrics.total_contacts
            );
        }
    }

    Ok(())
}

async fn standalone<S: RecordStage>(stage: &S, input: &Path, output: &Path) -> anyhow::Result<()> {
    let summary = run_stage(stage, input, output, &LogProgress).await?;
    eprintln!(
        "✅ {}: {}/{} succeeded, {} fell back → {}",
        summary.stage,
        summary.succeeded,
        summary.total,
        summary.failed,
        output.display()
    );
    Ok(())
}

/// Log to stderr and to a daily file under `log_dir`.
fn init_tracing(log_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "campaign.log"));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    guard
}
