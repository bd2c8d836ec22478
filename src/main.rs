use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use repo_sage::mcp_server::SageMcpServer;
use repo_sage::{Config, SageClient};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "repo-sage", version, long_version = LONG_VERSION, about)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "REPO_SAGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server over stdio (default)
    Serve,
    /// Index a repository into a project
    Index {
        repo_url: String,
        #[arg(long)]
        project: String,
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Ask a question about an indexed project
    Ask {
        #[arg(long)]
        project: String,
        question: String,
    },
    /// Summarize the latest commits of a repository into the project's commit log
    Poll {
        repo_url: String,
        #[arg(long)]
        project: String,
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Count the files of a repository (one credit each)
    Count {
        repo_url: String,
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::new()?);
    };
    let mut config = Config::from_file(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries the MCP protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let client = SageClient::with_config(config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!("Starting repo-sage MCP server");
            SageMcpServer::with_client(Arc::new(client))
                .run_stdio()
                .await?;
        }
        Command::Index {
            repo_url,
            project,
            token,
        } => {
            let records = client.create_index(&repo_url, token, &project).await?;
            println!("Indexed {} files into {}", records.len(), project);
            for record in records {
                println!("  {}", record.file_name);
            }
        }
        Command::Ask { project, question } => {
            let answer = client.ask(&question, &project).await?;
            let mut stream = answer.stream;
            let mut stdout = std::io::stdout();
            while let Some(chunk) = stream.next().await {
                write!(stdout, "{}", chunk?)?;
                stdout.flush()?;
            }
            println!();

            if !answer.file_references.is_empty() {
                println!("\nReferences:");
                for reference in &answer.file_references {
                    println!("  {} ({:.2})", reference.file_name, reference.similarity);
                }
            }
        }
        Command::Poll {
            repo_url,
            project,
            token,
        } => {
            client.register_project(&project, &repo_url, token).await?;
            let commits = client.poll_commits(&project).await?;
            println!("{} new commits", commits.len());
            for commit in commits {
                let short = commit.commit_hash.get(..7).unwrap_or(&commit.commit_hash);
                println!("  {} {}: {}", short, commit.commit_author, commit.summary);
            }
        }
        Command::Count { repo_url, token } => {
            let count = client.estimate_file_count(&repo_url, token).await?;
            println!("{}", count);
        }
    }

    Ok(())
}
