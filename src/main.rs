//! gavial CLI: scam-engagement honeypot core.

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use gavial::detect::DetectionContext;
use gavial::engine::{Engine, EngineConfig};

#[derive(Parser)]
#[command(name = "gavial", version, about = "Scam-engagement honeypot core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a message for scam risk.
    Analyze {
        /// The message text to analyze.
        message: String,

        /// Treat the sender as unknown (boosts signal weights).
        #[arg(long)]
        unknown_sender: bool,

        /// Show per-signal detail.
        #[arg(long)]
        verbose: bool,

        /// Emit raw JSON instead of the rendered explanation.
        #[arg(long)]
        json: bool,
    },

    /// Extract and validate structured identifiers from a message.
    Extract {
        /// The message text to extract from.
        message: String,
    },

    /// Run one message through a full engagement turn and print the outcome.
    Engage {
        /// The scammer's opening message.
        message: String,

        /// The sender's raw identifier (phone, handle, email).
        #[arg(long)]
        sender: Option<String>,
    },

    /// Show engine and safety status.
    Status,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let engine = Engine::new(EngineConfig::default()).into_diagnostic()?;

    match cli.command {
        Commands::Analyze {
            message,
            unknown_sender,
            verbose,
            json,
        } => {
            let context = DetectionContext {
                is_unknown_sender: unknown_sender,
                ..Default::default()
            };
            let result = engine.analyze(&message, Some(&context));
            if json {
                println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
            } else {
                println!("{}", result.explain(verbose));
            }
        }

        Commands::Extract { message } => {
            let extractor = gavial::extract::EntityExtractor::new();
            let validator = gavial::extract::EntityValidator::new();
            let extraction = extractor.extract(&message);

            if extraction.is_empty() {
                println!("no identifiers found");
                return Ok(());
            }
            for (entity_type, values) in &extraction.entities {
                for value in values {
                    let verdict = validator.validate(entity_type, value);
                    let flag = if verdict.is_authentic() {
                        "ok"
                    } else if verdict.is_suspected_fake {
                        "FAKE?"
                    } else {
                        "invalid"
                    };
                    println!("{entity_type:15} {value:30} [{flag}] {}", verdict.reason);
                }
            }
        }

        Commands::Engage { message, sender } => {
            let turn = engine
                .start_engagement(&message, sender.as_deref())
                .into_diagnostic()?;
            println!("conversation: {}", turn.conversation_id);
            println!("state:        {}", turn.state);
            println!("risk score:   {:.2}", turn.risk_score);
            println!("reply:        {}", turn.response);
            println!("continue:     {}", turn.should_continue);
            if !turn.extracted_intel.is_empty() {
                println!("intel:");
                for (entity_type, values) in &turn.extracted_intel {
                    println!("  {entity_type}: {}", values.join(", "));
                }
            }
        }

        Commands::Status => {
            print!("{}", engine.info());
            let status = engine.safety_status();
            println!(
                "  engagement date:   {} ({} terminated)",
                status.engagement_date, status.terminated_conversations
            );
        }
    }

    Ok(())
}
