use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use medsim_core::progression::{next_incomplete_index, CompletionMarkers};
use medsim_core::{
    AppContext, CoreConfig, CoreError, EvaluationRecord, UnconfiguredReplyGenerator, Username,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "medsim")]
#[command(about = "MedSim case catalog and evaluation records CLI")]
struct Cli {
    /// Root holding the case<N>/ folders
    #[arg(long, env = "CONVERSATIONS_DIR")]
    conversations_dir: Option<PathBuf>,
    /// Root holding evaluator records
    #[arg(long, env = "EVALUATORS_DIR")]
    evaluators_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the case catalog
    Cases,
    /// Show which cases a user has saved a conversation for
    Progress {
        username: String,
    },
    /// Create an evaluator record, or refresh an existing one
    CreateEvaluator {
        username: String,
    },
    /// Summarise an evaluator record
    ShowEvaluator {
        username: String,
    },
    /// List the scoring dimensions
    Dimensions,
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(|| "-".to_owned(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = Arc::new(CoreConfig::from_overrides(
        cli.conversations_dir,
        cli.evaluators_dir,
    ));
    let ctx = AppContext::new(
        cfg,
        Arc::new(UnconfiguredReplyGenerator::new(Vec::<String>::new())),
    );

    match cli.command {
        Some(Commands::Cases) => {
            let cases = ctx.catalog().list_cases();
            if cases.is_empty() {
                println!(
                    "No cases found under {}.",
                    ctx.cfg().conversations_dir().display()
                );
            }
            for case in cases {
                let complaint = ctx
                    .analyst_sessions()
                    .loader()
                    .load_case(case.index)
                    .and_then(|doc| doc.main_complaint)
                    .unwrap_or_else(|| "-".to_owned());
                println!("{:>3}  {:<8}  {}", case.index, case.folder.name(), complaint);
            }
        }
        Some(Commands::Progress { username }) => {
            let username = Username::parse(&username)?;
            let cases = ctx.catalog().list_cases();
            for case in cases {
                let mark = if ctx.conversations().is_complete(&case.folder, &username) {
                    "saved"
                } else {
                    "-"
                };
                println!("{:>3}  {:<8}  {}", case.index, case.folder.name(), mark);
            }
            let next = next_incomplete_index(cases, ctx.conversations(), &username);
            println!(
                "next case index: {} (all complete: {})",
                next.index, next.all_complete
            );
        }
        Some(Commands::CreateEvaluator { username }) => {
            let username = Username::parse(&username)?;
            let outcome = ctx.evaluator().create_user(&username)?;
            if outcome.created {
                println!("Created evaluator record: {}", outcome.path.display());
            } else {
                println!("Updated existing evaluator record: {}", outcome.path.display());
            }
        }
        Some(Commands::ShowEvaluator { username }) => {
            let username = Username::parse(&username)?;
            match ctx.evaluator().results(&username) {
                Ok(record) => print_record(&ctx, &username, &record),
                Err(CoreError::EvaluatorNotFound(_)) => {
                    println!("No evaluator record for {username}.");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Some(Commands::Dimensions) => {
            for dimension in ctx.evaluator().dimensions()? {
                println!("[{}] {}", dimension.category, dimension.dimension);
                for (score, anchor) in &dimension.anchors {
                    println!("    {score}: {anchor}");
                }
            }
        }
        None => {
            println!("Use 'medsim --help' for commands");
        }
    }

    Ok(())
}

fn print_record(ctx: &AppContext, username: &Username, record: &EvaluationRecord) {
    println!("Evaluator: {}", record.username);
    println!("Created:   {}", timestamp(record.created_at));
    println!("Updated:   {}", timestamp(record.updated_at));
    println!("Submitted: {}", timestamp(record.submitted_at));

    for (case_id, evaluation) in &record.evaluation_results {
        let feedback = record.feedback.get(case_id).map_or(0, |f| f.len());
        println!(
            "  {case_id}: saved={} evaluators={} ranked={} feedback={feedback}",
            evaluation.saved,
            evaluation.evaluators().len(),
            evaluation.ranking.as_ref().is_some_and(|r| !r.is_empty())
        );
    }

    let next = next_incomplete_index(ctx.catalog().list_cases(), record, username);
    println!(
        "next case index: {} (all complete: {})",
        next.index, next.all_complete
    );
}
