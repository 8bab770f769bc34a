use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use is_terminal::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use twig::areas::repository::Repository;
use twig::artifacts::core::PagerWriter;
use twig::artifacts::merge::{MergeOutcome, PickOutcome, StashPopOutcome};
use twig::commands::porcelain::log::LogOptions;
use twig::commands::porcelain::reset::ResetMode;
use twig::errors::RepositoryError;

const LOG_ENV: &str = "TWIG_LOG";
const NO_PAGER_ENV: &str = "NO_PAGER";

#[derive(Parser)]
#[command(
    name = "twig",
    version = "0.1.0",
    about = "A small local version control system",
    long_about = "twig tracks snapshots of a directory tree in a content-addressed object store. \
    It supports branching, merging, cherry-picking, stashing and garbage collection, \
    all without any network layer.",
    help_template = r"
{name} {version} - {about}

USAGE:
    {usage}

OPTIONS:
    {all-args}
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        name = "init",
        about = "Create an empty repository",
        long_about = "Creates the .twig control directory in the current directory or at the given path."
    )]
    Init {
        #[arg(index = 1, help = "The path to the repository")]
        path: Option<PathBuf>,
    },
    #[command(name = "add", about = "Stage files for the next commit")]
    Add {
        #[arg(index = 1, required = true, help = "Files or directories to stage")]
        paths: Vec<String>,
    },
    #[command(name = "unstage", about = "Remove files from the index")]
    Unstage {
        #[arg(index = 1, required = true, help = "Files or directories to untrack")]
        paths: Vec<String>,
    },
    #[command(
        name = "commit",
        about = "Record the index as a new commit",
        long_about = "Creates a commit from the current index. While a merge or cherry-pick is \
        pending, the commit concludes it and the recorded message is used by default."
    )]
    Commit {
        #[arg(short, long, help = "The commit message")]
        message: Option<String>,
        #[arg(long, help = "Override the author as \"Name <email>\"")]
        author: Option<String>,
    },
    #[command(name = "status", about = "Show the working tree status")]
    Status {
        #[arg(long, help = "Machine readable output")]
        porcelain: bool,
    },
    #[command(name = "log", about = "Show the commit history of HEAD")]
    Log {
        #[arg(short = 'n', long = "max-count", help = "Limit the number of commits")]
        max_count: Option<usize>,
        #[arg(long, help = "One commit per line")]
        oneline: bool,
    },
    #[command(name = "diff", about = "Show unstaged or staged changes")]
    Diff {
        #[arg(long, alias = "staged", help = "Compare the index against HEAD")]
        cached: bool,
    },
    #[command(name = "branch", about = "List, create or delete branches")]
    Branch(BranchArgs),
    #[command(name = "checkout", about = "Switch branches or detach HEAD at a commit")]
    Checkout {
        #[arg(short = 'b', help = "Create the branch before switching to it")]
        create: bool,
        #[arg(index = 1)]
        target: String,
    },
    #[command(name = "merge", about = "Merge a revision into HEAD")]
    Merge {
        #[arg(index = 1, required_unless_present = "abort")]
        target: Option<String>,
        #[arg(short, long, help = "The merge commit message")]
        message: Option<String>,
        #[arg(long, conflicts_with = "target", help = "Abandon a conflicted merge")]
        abort: bool,
    },
    #[command(name = "cherry-pick", about = "Apply the change introduced by a commit")]
    CherryPick {
        #[arg(index = 1)]
        commit: String,
        #[arg(short, long, help = "Override the commit message")]
        message: Option<String>,
    },
    #[command(name = "tag", about = "List, create or delete tags")]
    Tag(TagArgs),
    #[command(name = "stash", about = "Shelve and re-apply local changes")]
    Stash {
        #[command(subcommand)]
        command: StashCommands,
    },
    #[command(name = "reset", about = "Move HEAD, optionally rewinding the index and working tree")]
    Reset {
        #[arg(index = 1, help = "Target revision, HEAD by default")]
        target: Option<String>,
        #[arg(long, group = "mode")]
        soft: bool,
        #[arg(long, group = "mode")]
        mixed: bool,
        #[arg(long, group = "mode")]
        hard: bool,
    },
    #[command(name = "gc", about = "Delete unreachable objects")]
    Gc,
    #[command(name = "cat-file", about = "Print the content of an object")]
    CatFile {
        #[arg(short = 'p', long, help = "The object id to print")]
        oid: String,
    },
    #[command(
        name = "hash-object",
        about = "Hash a file and optionally write it to the object store"
    )]
    HashObject {
        #[arg(short, long, help = "Write the object to the object store")]
        write: bool,
        #[arg(index = 1)]
        file: String,
    },
}

#[derive(Args)]
struct BranchArgs {
    #[arg(index = 1, help = "Branch to create or delete")]
    names: Vec<String>,
    #[arg(short, long, help = "Delete the named branches")]
    delete: bool,
    #[arg(short = 'D', long, help = "Delete even when not fully merged")]
    force: bool,
}

#[derive(Args)]
struct TagArgs {
    #[arg(index = 1, help = "Tag to create or delete")]
    name: Option<String>,
    #[arg(index = 2, help = "Revision to tag, HEAD by default")]
    target: Option<String>,
    #[arg(short, long, requires = "message", help = "Create an annotated tag (implied by -m)")]
    annotate: bool,
    #[arg(short, long, help = "Annotation message")]
    message: Option<String>,
    #[arg(short, long, help = "Delete the named tag")]
    delete: bool,
}

#[derive(Subcommand)]
enum StashCommands {
    #[command(name = "save", about = "Stash local changes")]
    Save {
        #[arg(index = 1)]
        message: Option<String>,
    },
    #[command(name = "list", about = "List stash entries")]
    List,
    #[command(name = "pop", about = "Apply and drop the newest stash entry")]
    Pop,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            match RepositoryError::classify(&err) {
                Some(repository_error) if repository_error.is_fatal() => {
                    eprintln!("fatal: {err:#}")
                }
                _ => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// Runs one command; `Ok(false)` means it stopped on conflicts
async fn run(command: Commands) -> Result<bool> {
    let pwd = std::env::current_dir()?;

    match command {
        Commands::Init { path } => {
            let mut repository =
                Repository::new(path.unwrap_or(pwd), Box::new(std::io::stdout()))?;
            repository.init().await?;
        }
        Commands::Log { max_count, oneline } => {
            let options = LogOptions { max_count, oneline };
            if std::env::var_os(NO_PAGER_ENV).is_none() && std::io::stdout().is_terminal() {
                let pager = minus::Pager::new();
                {
                    let mut repository =
                        Repository::new(&pwd, Box::new(PagerWriter::new(pager.clone())))?;
                    repository.log(options).await?;
                }
                minus::page_all(pager)?;
            } else {
                let mut repository = Repository::new(&pwd, Box::new(std::io::stdout()))?;
                repository.log(options).await?;
            }
        }
        command => {
            let mut repository = Repository::new(&pwd, Box::new(std::io::stdout()))?;
            return run_in(&mut repository, command).await;
        }
    }

    Ok(true)
}

async fn run_in(repository: &mut Repository, command: Commands) -> Result<bool> {
    match command {
        Commands::Add { paths } => repository.add(&paths).await?,
        Commands::Unstage { paths } => repository.unstage(&paths).await?,
        Commands::Commit { message, author } => {
            repository
                .commit(message.as_deref(), author.as_deref())
                .await?;
        }
        Commands::Status { porcelain } => {
            repository.status(porcelain).await?;
        }
        Commands::Diff { cached } => repository.diff(cached).await?,
        Commands::Branch(args) => match (args.names.as_slice(), args.delete || args.force) {
            ([], _) => repository.list_branches().await?,
            (names, true) => repository.delete_branches(names, args.force).await?,
            ([name], false) => repository.branch(name, None).await?,
            ([name, source], false) => repository.branch(name, Some(source)).await?,
            _ => {
                return Err(RepositoryError::validation(
                    "usage: twig branch [<name> [<start>]] | -d <name>...",
                ));
            }
        },
        Commands::Checkout { create, target } => repository.checkout(&target, create).await?,
        Commands::Merge {
            target,
            message,
            abort,
        } => {
            if abort {
                repository.merge_abort().await?;
            } else if let Some(target) = target {
                let outcome = repository.merge(&target, message.as_deref()).await?;
                return Ok(!matches!(outcome, MergeOutcome::Conflicted(_)));
            }
        }
        Commands::CherryPick { commit, message } => {
            let outcome = repository.cherry_pick(&commit, message.as_deref()).await?;
            return Ok(!matches!(outcome, PickOutcome::Conflicted(_)));
        }
        Commands::Tag(args) => match (args.name, args.delete) {
            (None, _) => repository.list_tags().await?,
            (Some(name), true) => repository.delete_tags(&[name]).await?,
            (Some(name), false) => {
                repository
                    .tag(&name, args.target.as_deref(), args.message.as_deref())
                    .await?;
            }
        },
        Commands::Stash { command } => match command {
            StashCommands::Save { message } => {
                repository.stash_save(message.as_deref()).await?;
            }
            StashCommands::List => repository.stash_list().await?,
            StashCommands::Pop => {
                let outcome = repository.stash_pop().await?;
                return Ok(!matches!(outcome, StashPopOutcome::Conflicted(_)));
            }
        },
        Commands::Reset {
            target,
            soft,
            mixed: _,
            hard,
        } => {
            let mode = if soft {
                ResetMode::Soft
            } else if hard {
                ResetMode::Hard
            } else {
                ResetMode::Mixed
            };
            repository.reset(target.as_deref(), mode).await?;
        }
        Commands::Gc => {
            repository.gc().await?;
        }
        Commands::CatFile { oid } => repository.cat_file(&oid).await?,
        Commands::HashObject { write, file } => repository.hash_object(&file, write).await?,
        // opened with their own path or writer in `run`
        Commands::Init { .. } | Commands::Log { .. } => {}
    }

    Ok(true)
}
