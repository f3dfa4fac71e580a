mod config;
mod logging;

use std::io::{self, BufRead, Write};

use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio::sync::broadcast;
use topics_core::{
    MutationAck, PendingMutation, SyncState, Topic, TopicInput, TopicRef, TopicView,
    TopicsController, TopicsError, TopicsSnapshot,
};
use topics_http::HttpTopicsClient;
use tracing::{debug, info};

use crate::config::{CliConfig, ConfigError};

const EVENT_BUFFER: usize = 64;

#[derive(Parser)]
#[command(name = "topics-cli")]
#[command(about = "Manage topics on a remote REST collection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the first page of topics
    List,

    /// Fetch one topic from the server
    Show {
        /// Server id
        id: u64,
    },

    /// Create a topic
    Create {
        /// Title (at least 3 characters)
        #[arg(long)]
        title: String,
        /// Body (at least 10 characters)
        #[arg(long)]
        body: String,
    },

    /// Replace a topic's title and body
    Update {
        /// Server id
        id: u64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
    },

    /// Delete a topic
    Delete {
        /// Server id
        id: u64,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Topics(#[from] TopicsError),
    #[error("topic #{0} is not in the loaded list")]
    NotListed(u64),
    #[error("{kind} was rolled back ({code})")]
    RolledBack { kind: String, code: String },
    #[error("{0} was superseded before it could apply")]
    Superseded(String),
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();

    if let Err(err) = run(cli.command).await {
        eprintln!("topics-cli: {err}");
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<(), CliError> {
    let config = CliConfig::from_env()?;
    info!(
        base_url = %config.http.base_url,
        collection = %config.http.collection,
        "starting topics-cli"
    );

    let client = HttpTopicsClient::new(config.http)?;
    let (events, _) = broadcast::channel(EVENT_BUFFER);
    let controller = TopicsController::new(client, events, config.controller);

    match command {
        Commands::List => {
            controller.refresh().await?;
            print_snapshot(&controller.snapshot());
        }
        Commands::Show { id } => {
            let topic = controller.get_topic(id).await?;
            print_topic(&topic);
        }
        Commands::Create { title, body } => {
            controller.refresh().await?;
            let pending = controller.create_topic(TopicInput::new(title, body))?;
            settle(&controller, pending).await?;
        }
        Commands::Update { id, title, body } => {
            controller.refresh().await?;
            let pending = controller
                .update_topic(TopicRef::Remote(id), TopicInput::new(title, body))?
                .ok_or(CliError::NotListed(id))?;
            settle(&controller, pending).await?;
        }
        Commands::Delete { id, yes } => {
            controller.refresh().await?;
            let target = TopicRef::Remote(id);
            if !controller.snapshot().topics.iter().any(|view| view.id == target) {
                return Err(CliError::NotListed(id));
            }
            match controller.delete_topic(target, |view| yes || confirm_on_stdin(view)) {
                Some(pending) => settle(&controller, pending).await?,
                None => println!("Exclusão cancelada."),
            }
        }
    }

    Ok(())
}

async fn settle(
    controller: &TopicsController<HttpTopicsClient>,
    pending: PendingMutation,
) -> Result<(), CliError> {
    debug!(target_ref = %pending.target(), "waiting for settlement");
    let ack = pending.settled().await?;
    print_snapshot(&controller.snapshot());
    check_ack(&ack)
}

fn check_ack(ack: &MutationAck) -> Result<(), CliError> {
    let kind = format!("{:?}", ack.kind).to_lowercase();
    if let Some(code) = &ack.error_code {
        return Err(CliError::RolledBack {
            kind,
            code: code.clone(),
        });
    }
    if ack.superseded {
        return Err(CliError::Superseded(kind));
    }
    Ok(())
}

fn confirm_on_stdin(view: &TopicView) -> bool {
    eprint!("Deseja excluir {} \"{}\"? [s/N] ", view.id, view.title);
    let _ = io::stderr().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "s" | "sim" | "y" | "yes")
}

fn sync_label(sync: SyncState) -> &'static str {
    match sync {
        SyncState::Confirmed => "",
        SyncState::PendingCreate => " (salvando)",
        SyncState::PendingUpdate => " (atualizando)",
        SyncState::PendingDelete => " (excluindo)",
    }
}

fn print_snapshot(snapshot: &TopicsSnapshot) {
    if snapshot.topics.is_empty() {
        println!("Nenhum tópico.");
    }
    for view in &snapshot.topics {
        println!("{:>8}  {}{}", view.id.to_string(), view.title, sync_label(view.sync));
    }
    if let Some(message) = &snapshot.success {
        println!("{message}");
    }
    if let Some(message) = &snapshot.error {
        eprintln!("{message}");
    }
}

fn print_topic(topic: &Topic) {
    println!("#{} {}", topic.id, topic.title);
    if let Some(user_id) = topic.user_id {
        println!("autor: {user_id}");
    }
    println!();
    println!("{}", topic.body);
}
