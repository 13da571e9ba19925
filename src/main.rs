//! phpbb-acl - permission maintenance tool
//!
//! Inspects and resets the permission snapshots stored in a phpBB
//! database mirrored to MongoDB.

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use phpbb_acl::AclConfig;
use phpbb_acl::database::{ForumId, UserId};
use phpbb_acl::permissions::OptionFilter;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser)]
#[command(name = "phpbb-acl", about = "Inspect and reset forum permission snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check one option for a user; prints true or false.
    Check {
        user_id: UserId,
        /// Option name, prefix with ! to negate.
        option: String,
        #[arg(default_value_t = 0)]
        forum_id: ForumId,
    },

    /// Evaluate a local option in every forum.
    Forums {
        user_id: UserId,
        option: String,
        /// Only list forums where the result is true.
        #[arg(long)]
        clean: bool,
    },

    /// Print the option names a user holds, per forum.
    Show { user_id: UserId },

    /// List users holding an option (% wildcards allowed).
    List { option: String, forum_id: Option<ForumId> },

    /// Reset stored snapshots of the given users, or of everyone.
    Clear { user_ids: Vec<UserId> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("phpbb_acl=info,mongodb=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AclConfig::from_env()?;
    let acl = phpbb_acl::connect(&config).await?;

    match cli.command {
        Command::Check { user_id, option, forum_id } => {
            println!("{}", acl.get(user_id, &option, forum_id).await?);
        }
        Command::Forums { user_id, option, clean } => {
            let forums = acl.get_for_forums(user_id, &option, clean).await?;
            println!("{}", serde_json::to_string_pretty(&forums)?);
        }
        Command::Show { user_id } => {
            let snapshot = acl.provider().get_acl(user_id).await?;
            let options = acl.provider().options().load().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot.granted(&options))?);
        }
        Command::List { option, forum_id } => {
            let filter = OptionFilter::new([option]);
            let forums: Option<Vec<ForumId>> = forum_id.map(|id| vec![id]);
            let list = acl.get_list(None, Some(&filter), forums.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        Command::Clear { user_ids } => {
            let targets = (!user_ids.is_empty()).then_some(user_ids.as_slice());
            acl.provider().clear_prefetch(targets).await?;
            info!("Permission snapshots cleared");
        }
    }

    Ok(())
}
