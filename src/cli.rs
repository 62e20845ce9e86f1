use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser, Subcommand};
use dialoguer::Select;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use roadmap_editor::notion::NotionStore;
use roadmap_editor::publish::{PublishConfig, SqlitePublishStore};
use roadmap_editor::{
    Catalog, ContentStore, EditorSession, Graph, LayoutSnapshot, PublishStore, SaveOutcome,
    export_file_name, normalize_import,
};

#[derive(Debug, Parser)]
#[command(
    name = "roadmap",
    about = "Maintain roadmap layouts stored in Notion and share read-only snapshots."
)]
pub struct Cli {
    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", global = true, action = ArgAction::SetTrue)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch topics and the saved layout, and write the merged layout to a file.
    Pull {
        /// Output path. Use '-' for stdout. Defaults to a dated file name.
        #[arg(short = 'o', long = "output")]
        output: Option<String>,
    },
    /// Replace the saved layout with the contents of a layout file.
    Push {
        /// Layout file in any accepted shape. Use '-' to read from stdin.
        #[arg(short = 'i', long = "input")]
        input: String,

        /// Skip the confirmation prompt.
        #[arg(short = 'y', long = "yes", action = ArgAction::SetTrue)]
        yes: bool,
    },
    /// Publish the roadmap for read-only sharing.
    Publish {
        /// Title shown on the shared page.
        #[arg(short = 't', long = "title")]
        title: Option<String>,

        /// Publish this layout instead of the saved one.
        #[arg(short = 'i', long = "input")]
        input: Option<String>,
    },
    /// Show a published roadmap.
    View {
        /// Short id returned by `publish`.
        id: String,

        /// Print the stored payload as JSON.
        #[arg(long = "json", action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Rewrite a layout file (legacy shapes included) in the canonical shape.
    Normalize {
        /// Input path. Use '-' or omit to read from stdin.
        #[arg(short = 'i', long = "input")]
        input: Option<String>,

        /// Output path. Use '-' or omit to write to stdout.
        #[arg(short = 'o', long = "output")]
        output: Option<String>,
    },
    /// Delete expired published roadmaps.
    Cleanup,
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

pub async fn dispatch() -> Result<()> {
    let cli = Cli::parse();
    let quiet = cli.quiet;
    match cli.command {
        Command::Pull { output } => run_pull(output, quiet).await,
        Command::Push { input, yes } => run_push(&input, yes, quiet).await,
        Command::Publish { title, input } => run_publish(title, input, quiet).await,
        Command::View { id, json } => run_view(&id, json).await,
        Command::Normalize { input, output } => run_normalize(input, output, quiet),
        Command::Cleanup => run_cleanup(quiet).await,
    }
}

fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::default_roadmap())
}

async fn run_pull(output: Option<String>, quiet: bool) -> Result<()> {
    let store = NotionStore::from_env()?;
    let session = EditorSession::load(&store, catalog())
        .await
        .context("failed to load the roadmap from Notion")?;
    let json = session.export_json()?;

    let dest = match output.as_deref() {
        Some("-") => OutputDestination::Stdout,
        Some(path) => OutputDestination::File(PathBuf::from(path)),
        None => OutputDestination::File(PathBuf::from(export_file_name(
            chrono::Local::now().date_naive(),
        ))),
    };
    write_output(dest, json.as_bytes(), quiet)
}

async fn run_push(input: &str, yes: bool, quiet: bool) -> Result<()> {
    let snapshot = read_layout(Some(input))?;
    let store = NotionStore::from_env()?;
    let topics = store
        .list_topics()
        .await
        .context("failed to fetch topics from Notion")?;
    let session = EditorSession::new(Graph::build(catalog(), &topics, Some(&snapshot)));

    if !yes && !confirm_overwrite()? {
        if !quiet {
            println!("Push cancelled.");
        }
        return Ok(());
    }

    match session.save_to_content_store(&store).await? {
        SaveOutcome::Completed(()) => {
            if !quiet {
                println!(
                    "Saved layout: {} nodes, {} groups, {} edges",
                    session.graph().nodes().len(),
                    session.graph().groups().len(),
                    session.graph().edges().len()
                );
            }
            Ok(())
        }
        SaveOutcome::InFlight => bail!("another save is already running"),
    }
}

fn confirm_overwrite() -> Result<bool> {
    let options = ["Overwrite the saved layout", "Cancel"];
    let selection = Select::new()
        .with_prompt("The saved layout in Notion will be replaced")
        .items(&options)
        .default(1)
        .interact()
        .context("confirmation was cancelled")?;
    Ok(selection == 0)
}

async fn run_publish(title: Option<String>, input: Option<String>, quiet: bool) -> Result<()> {
    let content = NotionStore::from_env()?;
    let (topics, saved) = content
        .fetch_roadmap()
        .await
        .context("failed to load the roadmap from Notion")?;
    let layout = match input.as_deref() {
        Some(path) => Some(read_layout(Some(path))?),
        None => saved,
    };
    let session = EditorSession::new(Graph::build(catalog(), &topics, layout.as_ref()));

    let publisher = SqlitePublishStore::new(PublishConfig::default()).await?;
    match session.publish(&publisher, title.as_deref()).await? {
        SaveOutcome::Completed(receipt) => {
            if quiet {
                println!("{}", receipt.id);
            } else {
                println!("Published {} -> {}", receipt.id, receipt.url);
                println!(
                    "Expires in {} days ({})",
                    receipt.expires_in_days,
                    receipt.expires_at.format("%Y-%m-%d")
                );
            }
            Ok(())
        }
        SaveOutcome::InFlight => bail!("another publish is already running"),
    }
}

async fn run_view(id: &str, json: bool) -> Result<()> {
    let publisher = SqlitePublishStore::new(PublishConfig::default()).await?;
    let roadmap = publisher
        .fetch_published(id)
        .await
        .with_context(|| format!("failed to load published roadmap '{id}'"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&roadmap)?);
        return Ok(());
    }

    println!("{} ({})", roadmap.title, roadmap.id);
    println!("Published {}", roadmap.created_at.format("%Y-%m-%d %H:%M UTC"));
    let session = EditorSession::from_published(roadmap, catalog());
    for group in session.graph().groups() {
        let children = session.graph().children_of(&group.id);
        if children.is_empty() {
            continue;
        }
        println!("{}{}", "  ".repeat(group.depth), group.label);
        for node in children {
            let topic = &node.topic;
            let link = if topic.has_link() { topic.link.as_str() } else { "(coming soon)" };
            println!("{}- {} {}", "  ".repeat(group.depth + 1), topic.name, link);
        }
    }
    Ok(())
}

fn run_normalize(input: Option<String>, output: Option<String>, quiet: bool) -> Result<()> {
    let snapshot = read_layout(input.as_deref())?;
    let json = snapshot.to_json_pretty()?;
    let dest = match output.as_deref() {
        None | Some("-") => OutputDestination::Stdout,
        Some(path) => OutputDestination::File(PathBuf::from(path)),
    };
    write_output(dest, json.as_bytes(), quiet)
}

async fn run_cleanup(quiet: bool) -> Result<()> {
    let publisher = SqlitePublishStore::new(PublishConfig::default()).await?;
    let removed = publisher.cleanup_expired().await?;
    if !quiet {
        println!("Removed {removed} expired roadmap(s)");
    }
    Ok(())
}

fn read_layout(input: Option<&str>) -> Result<LayoutSnapshot> {
    let text = match input {
        None | Some("-") => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
        Some(path) => fs::read_to_string(path).with_context(|| format!("failed to read '{path}'"))?,
    };
    if text.trim().is_empty() {
        return Err(anyhow!("no layout supplied"));
    }
    normalize_import(&text).context("could not read the layout file")
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.write_all(b"\n")?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("Wrote layout -> {}", path.display());
            }
        }
    }
    Ok(())
}
