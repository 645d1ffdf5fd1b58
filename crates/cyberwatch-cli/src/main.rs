mod display;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use cyberwatch_ai::{InferenceConfig, InferenceService, TextCleaning};
use cyberwatch_core::{AccountType, LoginId, NewAccount, NewPost, PostId};
use cyberwatch_ingest::CommentHandler;
use cyberwatch_store::{CommentStore, DuckStore};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "cyberwatch",
    version,
    about = "Flag bullying comments on a social feed"
)]
struct Cli {
    /// Directory holding tokenizer.json and weights.json (or model.onnx)
    #[arg(long, env = "CYBERWATCH_MODEL_DIR", default_value = "models/cyberbullying")]
    model_dir: PathBuf,

    /// Strip everything but ASCII letters and whitespace before tokenizing
    #[arg(long, env = "CYBERWATCH_CLEAN_TEXT")]
    clean_text: bool,

    /// DuckDB database file, required by every command that touches storage
    #[arg(long, env = "CYBERWATCH_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Label a piece of text
    Classify { text: String },
    /// Create the database schema
    InitDb,
    /// Create a login with its profile
    AddUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        admin: bool,
    },
    /// Create a post owned by a login
    AddPost {
        #[arg(long)]
        author: LoginId,
        #[arg(long, default_value = "")]
        desc: String,
    },
    /// Classify and store a comment
    Comment {
        #[arg(long)]
        author: Option<LoginId>,
        #[arg(long)]
        post: Option<PostId>,
        text: Option<String>,
    },
    /// List the comments on a post
    Comments {
        #[arg(long)]
        post: PostId,
        /// Print an Arrow table instead of cards
        #[arg(long)]
        table: bool,
    },
}

impl Cli {
    fn inference_config(&self) -> InferenceConfig {
        let cleaning = if self.clean_text {
            TextCleaning::LettersOnly
        } else {
            TextCleaning::Raw
        };
        InferenceConfig::new(&self.model_dir).with_cleaning(cleaning)
    }

    /// Open the database file named by `--db`.
    fn open_store(&self) -> anyhow::Result<DuckStore> {
        let Some(path) = &self.db else {
            bail!("no database given: pass --db <FILE> or set CYBERWATCH_DB");
        };
        DuckStore::open_persistent(path)
            .with_context(|| format!("opening database {}", path.display()))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!("cyberwatch v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Command::Classify { text } => {
            let service = InferenceService::shared(&cli.inference_config());
            println!("{}", service.classify(text));
        }
        Command::InitDb => {
            let store = cli.open_store()?;
            store.init_schema().context("creating schema")?;
            eprintln!("Schema ready");
        }
        Command::AddUser {
            username,
            name,
            email,
            admin,
        } => {
            let mut store = cli.open_store()?;
            let account = NewAccount {
                username: username.clone(),
                name: name.clone(),
                email: email.clone(),
                account_type: if *admin {
                    AccountType::Admin
                } else {
                    AccountType::User
                },
            };
            let login = store
                .create_account(&account)
                .with_context(|| format!("creating account {username}"))?;
            println!("{login}");
        }
        Command::AddPost { author, desc } => {
            let store = cli.open_store()?;
            let Some(profile) = store.author_profile(*author)? else {
                bail!("no user with login id {author}");
            };
            let post = store.create_post(&NewPost {
                author: profile,
                description: desc.clone(),
            })?;
            println!("{post}");
        }
        Command::Comment { author, post, text } => {
            let store = cli.open_store()?;
            let service = InferenceService::shared(&cli.inference_config());
            let handler = CommentHandler::new(&store, service);
            let added = handler
                .add_comment(*author, *post, text.as_deref())
                .context("adding comment")?;
            println!("{}", serde_json::to_string(&added)?);
        }
        Command::Comments { post, table } => {
            let store = cli.open_store()?;
            if *table {
                let batches = store.comments_arrow(*post)?;
                println!("{}", arrow::util::pretty::pretty_format_batches(&batches)?);
            } else {
                let comments = cyberwatch_ingest::view_comments(&store, *post)?;
                display::print_comment_cards(*post, &comments);
            }
        }
    }

    Ok(())
}
