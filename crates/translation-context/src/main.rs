// translation-context/src/main.rs

#[cfg(feature = "cli")]
mod cli {
    use anyhow::{Context, Result};
    use clap::{Parser, Subcommand};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tracing::info;

    use translation_context::memory_db::MemoryDatabase;
    use translation_context::{
        create_orchestrator, metrics, ClientRegistry, Config, ContextOrchestrator, ContextRequest,
        EngineStores, FeedbackInput, InMemoryMessageStore, Message, MessageTranslationRequest,
        TranslationMode, TranslationRequest,
    };

    #[derive(Parser)]
    #[command(name = "translation-context")]
    #[command(about = "Context-aware chat translation with translation memory", long_about = None)]
    pub struct Cli {
        /// Use the echo translator and skip the classifier
        #[arg(long, global = true)]
        offline: bool,

        #[command(subcommand)]
        command: Commands,
    }

    #[derive(Subcommand)]
    enum Commands {
        /// Print the enhanced context for a message
        Context {
            /// JSON array of {id, text, sender_id, timestamp}
            #[arg(long, value_name = "FILE")]
            messages: PathBuf,
            #[arg(long)]
            session: String,
            #[arg(long)]
            message_id: String,
            #[arg(long)]
            user: Option<String>,
            #[arg(long)]
            recipient: Option<String>,
            #[arg(long, default_value_t = 25)]
            max_messages: usize,
        },
        /// Translate text, with conversation context when a message file is given
        Translate {
            #[arg(long)]
            text: String,
            #[arg(long, default_value = "auto")]
            source_lang: String,
            #[arg(long)]
            target_lang: String,
            #[arg(long, default_value = "casual")]
            mode: TranslationMode,
            #[arg(long, default_value = "")]
            model: String,
            #[arg(long, value_name = "FILE", requires_all = ["session", "message_id", "user"])]
            messages: Option<PathBuf>,
            #[arg(long)]
            session: Option<String>,
            #[arg(long)]
            message_id: Option<String>,
            #[arg(long)]
            user: Option<String>,
        },
        /// Record a user correction
        Feedback {
            #[arg(long)]
            user: String,
            #[arg(long)]
            original_text: String,
            #[arg(long)]
            original_translation: String,
            #[arg(long)]
            corrected: String,
            #[arg(long)]
            source_lang: String,
            #[arg(long)]
            target_lang: String,
        },
        /// Translation memory and database statistics
        Stats,
    }

    fn load_messages(path: &Path, session: &str) -> Result<Arc<InMemoryMessageStore>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read messages from {}", path.display()))?;
        let messages: Vec<Message> = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON array of messages", path.display()))?;
        info!("Loaded {} messages into session {}", messages.len(), session);

        let store = Arc::new(InMemoryMessageStore::new());
        store.add_messages(session, messages);
        Ok(store)
    }

    fn build(
        config: &Config,
        offline: bool,
        messages: Arc<InMemoryMessageStore>,
    ) -> Result<(ContextOrchestrator, Option<Arc<MemoryDatabase>>)> {
        if !offline {
            return create_orchestrator(config, messages);
        }
        let (stores, database) = EngineStores::from_backend(config.store_backend, &config.database_path)?;
        let orchestrator = ContextOrchestrator::new(
            ClientRegistry::offline(),
            messages,
            stores,
            config.orchestrator_config(),
        );
        Ok((orchestrator, database))
    }

    fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    pub async fn run(cli: Cli, config: Config) -> Result<()> {
        match cli.command {
            Commands::Context {
                messages,
                session,
                message_id,
                user,
                recipient,
                max_messages,
            } => {
                let store = load_messages(&messages, &session)?;
                let (orchestrator, _) = build(&config, cli.offline, store)?;
                let request = ContextRequest {
                    max_messages,
                    current_user_id: user,
                    recipient_id: recipient,
                    ..ContextRequest::new(session, message_id)
                };
                let context = orchestrator.get_enhanced_context(&request).await?;
                print_json(&context)?;
                orchestrator.close().await;
            }
            Commands::Translate {
                text,
                source_lang,
                target_lang,
                mode,
                model,
                messages,
                session,
                message_id,
                user,
            } => match (messages, session, message_id, user) {
                (Some(path), Some(session), Some(message_id), Some(user)) => {
                    let store = load_messages(&path, &session)?;
                    let (orchestrator, _) = build(&config, cli.offline, store)?;
                    let result = orchestrator
                        .translate_message(&MessageTranslationRequest {
                            session_id: session,
                            message_id,
                            text,
                            source_lang,
                            target_lang,
                            model,
                            mode,
                            current_user_id: user,
                            max_messages: 25,
                            ..MessageTranslationRequest::default()
                        })
                        .await?;
                    print_json(&result)?;
                    orchestrator.close().await;
                }
                (_, _, _, user) => {
                    let (orchestrator, _) = build(&config, cli.offline, Arc::new(InMemoryMessageStore::new()))?;
                    let translation = orchestrator
                        .translate_with_context(&TranslationRequest {
                            text,
                            source_lang,
                            target_lang,
                            model,
                            mode,
                            user_id: user,
                            ..TranslationRequest::default()
                        })
                        .await?;
                    println!("{}", translation);
                    orchestrator.close().await;
                }
            },
            Commands::Feedback {
                user,
                original_text,
                original_translation,
                corrected,
                source_lang,
                target_lang,
            } => {
                let (orchestrator, _) = build(&config, cli.offline, Arc::new(InMemoryMessageStore::new()))?;
                let record = orchestrator.record_feedback(FeedbackInput {
                    user_id: user,
                    original_text,
                    original_translation,
                    corrected_translation: corrected,
                    source_lang,
                    target_lang,
                    ..FeedbackInput::default()
                })?;
                match record {
                    Some(record) => print_json(&record)?,
                    None => eprintln!("Feedback could not be stored"),
                }
            }
            Commands::Stats => {
                let (orchestrator, database) = build(&config, true, Arc::new(InMemoryMessageStore::new()))?;
                print_json(&orchestrator.memory_stats()?)?;
                if let Some(database) = database {
                    print_json(&database.get_stats()?)?;
                }
                print!("{}", metrics::render());
            }
        }
        Ok(())
    }
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    if dotenvy::dotenv().is_err() {
        eprintln!("No .env file found, using process environment");
    }
    translation_context::telemetry::init_tracing();
    translation_context::metrics::init_metrics();

    let cli = cli::Cli::parse();
    let config = translation_context::Config::from_env()?;
    cli::run(cli, config).await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
