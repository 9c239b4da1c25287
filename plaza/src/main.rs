use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use plaza::api::{ApiClient, ClientEvents, SocialApi};
use plaza::auth::{AuthFlow, Credentials, Registration};
use plaza::config::Settings;
use plaza::confirm::{AssumeYes, Confirm, TerminalConfirm};
use plaza::display::{render_comment, render_post};
use plaza::feed::{Feed, ImageUpload};
use plaza::logging::{self, LogConfig};
use plaza::session::SessionContext;
use plaza::storage::{FileStorageAdapter, MemoryStorageAdapter, StorageAdapter};
use plaza::thread::PostThread;
use plaza_types::{CommentId, PostId, Visibility};

/// Plaza - a small social feed, from the terminal
#[derive(Parser)]
#[command(name = "plaza")]
#[command(about = "Post, comment and like on a Plaza server")]
#[command(version)]
struct Cli {
    /// API root, e.g. http://localhost:8080/api
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Answer yes to every confirmation prompt
    #[arg(long, short, global = true)]
    yes: bool,

    /// Keep the session in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account and log in
    Register {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "PLAZA_PASSWORD")]
        password: String,
        /// Defaults to --password
        #[arg(long)]
        confirm_password: Option<String>,
    },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PLAZA_PASSWORD")]
        password: String,
    },
    Logout,
    /// Show who is logged in
    Whoami,
    /// Show the newest posts
    Feed {
        /// How many pages to fetch
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Publish a post
    Post {
        content: String,
        /// Image file to attach
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long)]
        private: bool,
    },
    EditPost {
        post_id: u64,
        #[arg(long)]
        content: Option<String>,
        #[arg(long, conflicts_with = "public")]
        private: bool,
        #[arg(long)]
        public: bool,
    },
    LikePost {
        post_id: u64,
    },
    DeletePost {
        post_id: u64,
    },
    /// Show a post with its comments
    Comments {
        post_id: u64,
        /// Also load every comment's replies
        #[arg(long)]
        replies: bool,
    },
    Comment {
        post_id: u64,
        content: String,
    },
    Reply {
        post_id: u64,
        comment_id: u64,
        content: String,
    },
    /// Show the replies to a comment
    Replies {
        post_id: u64,
        comment_id: u64,
    },
    LikeComment {
        post_id: u64,
        comment_id: u64,
        /// Top-level comment the target replies to
        #[arg(long)]
        parent: Option<u64>,
    },
    DeleteComment {
        post_id: u64,
        comment_id: u64,
        /// Top-level comment the target replies to
        #[arg(long)]
        parent: Option<u64>,
    },
    /// List who liked a post or a comment
    Likes {
        post_id: u64,
        #[arg(long)]
        comment: Option<u64>,
    },
}

/// Failure hooks for the terminal: errors go to stderr
struct TerminalEvents;

impl ClientEvents for TerminalEvents {
    fn on_error(&self, message: &str) {
        eprintln!("Error: {}", message);
    }

    fn on_unauthorized(&self) {
        eprintln!("Your session has expired. Run `plaza login` to sign in again.");
    }
}

struct Session {
    client: ApiClient,
    api: Arc<dyn SocialApi>,
    confirm: Arc<dyn Confirm>,
    page_size: u32,
}

impl Session {
    /// Fetch a post and wrap it in a thread controller
    async fn thread(&self, post_id: u64) -> Result<PostThread> {
        let post = self.client.get_post(PostId(post_id)).await?;
        Ok(PostThread::new(post, self.api.clone(), self.confirm.clone()))
    }

    /// A thread with its comments (and optionally one reply set) loaded
    async fn loaded_thread(&self, post_id: u64, parent: Option<u64>) -> Result<PostThread> {
        let thread = self.thread(post_id).await?;
        thread.toggle_thread().await?;
        if let Some(parent) = parent {
            thread.toggle_replies(CommentId(parent)).await?;
        }
        Ok(thread)
    }

    fn require_login(&self) -> Result<()> {
        if !self.client.session().is_authenticated() {
            bail!("Not logged in. Run `plaza login` first.");
        }
        Ok(())
    }
}

fn log_config(settings: &Settings, verbose: bool) -> LogConfig {
    let base = if verbose {
        LogConfig::verbose()
    } else {
        LogConfig {
            level: settings.log_level(),
            ..LogConfig::default()
        }
    };
    LogConfig {
        log_file: PathBuf::from(&settings.logging.file),
        ..base
    }
}

async fn read_image(path: &Path) -> Result<ImageUpload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Image path has no file name")?;
    Ok(ImageUpload { file_name, bytes })
}

fn print_thread(thread: &PostThread) {
    let now = Utc::now();
    let state = thread.snapshot();
    let Some(post) = state.post else {
        println!("(post deleted)");
        return;
    };

    println!("{}\n", render_post(&post, now));
    if state.comments.is_empty() {
        println!("No comments yet.");
    }
    for node in &state.comments {
        println!("{}", render_comment(&node.comment, now));
        if node.replies_visible {
            for reply in &node.replies {
                println!("{}", render_comment(reply, now));
            }
        }
    }
}

async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let storage: Arc<dyn StorageAdapter> = if cli.ephemeral {
        Arc::new(MemoryStorageAdapter::new())
    } else {
        Arc::new(FileStorageAdapter::new()?)
    };
    let session = SessionContext::restore(storage);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.api.timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let api_url = settings.api_url(cli.api_url.as_deref());
    log::info!("Using API at {}", api_url);

    let client = ApiClient::new(api_url, session)
        .with_http_client(http)
        .with_events(Arc::new(TerminalEvents));
    let confirm: Arc<dyn Confirm> = if cli.yes {
        Arc::new(AssumeYes)
    } else {
        Arc::new(TerminalConfirm)
    };
    let ctx = Session {
        api: Arc::new(client.clone()),
        client,
        confirm,
        page_size: settings.feed.page_size,
    };
    let auth = AuthFlow::new(ctx.client.clone());

    match cli.command {
        Command::Register {
            first_name,
            last_name,
            email,
            password,
            confirm_password,
        } => {
            let registration = Registration {
                first_name,
                last_name,
                email,
                confirm_password: confirm_password.unwrap_or_else(|| password.clone()),
                password,
            };
            let user = auth.register(&registration).await?;
            println!("Welcome, {}!", user.display_name());
        }
        Command::Login { email, password } => {
            let user = auth.login(&Credentials { email, password }).await?;
            println!("Logged in as {}", user.display_name());
        }
        Command::Logout => {
            auth.logout()?;
            println!("Logged out");
        }
        Command::Whoami => match auth.restore().await? {
            Some(user) => println!("{} <{}>", user.display_name(), user.email),
            None => println!("Not logged in"),
        },
        Command::Feed { pages } => {
            ctx.require_login()?;
            let mut feed = Feed::new(ctx.api.clone(), ctx.confirm.clone())
                .with_page_size(ctx.page_size);
            feed.refresh().await?;
            for _ in 1..pages {
                if feed.load_more().await? == 0 {
                    break;
                }
            }

            let now = Utc::now();
            for thread in feed.threads() {
                if let Some(post) = thread.post() {
                    println!("{}\n", render_post(&post, now));
                }
            }
            if feed.has_more() {
                println!("... {} posts in total", feed.total());
            }
        }
        Command::Post {
            content,
            image,
            private,
        } => {
            ctx.require_login()?;
            let image = match image {
                Some(path) => Some(read_image(&path).await?),
                None => None,
            };
            let visibility = Visibility::from_private(private);
            let mut feed = Feed::new(ctx.api.clone(), ctx.confirm.clone());
            let thread = feed.publish(&content, image, visibility).await?;
            if let Some(post) = thread.post() {
                println!("Posted #{}", post.id);
                if let Some(path) = &post.image_url {
                    println!("Image: {}", ctx.client.image_url(path));
                }
            }
        }
        Command::EditPost {
            post_id,
            content,
            private,
            public,
        } => {
            ctx.require_login()?;
            let visibility = match (private, public) {
                (true, _) => Some(Visibility::Private),
                (_, true) => Some(Visibility::Public),
                _ => None,
            };
            if content.is_none() && visibility.is_none() {
                bail!("Nothing to change; pass --content, --private or --public");
            }
            let post = ctx.client.get_post(PostId(post_id)).await?;
            let mut feed = Feed::new(ctx.api.clone(), ctx.confirm.clone());
            let thread = feed.track(post);
            feed.edit_post(PostId(post_id), content, visibility).await?;
            if let Some(post) = thread.post() {
                println!("{}", render_post(&post, Utc::now()));
            }
        }
        Command::LikePost { post_id } => {
            ctx.require_login()?;
            let thread = ctx.thread(post_id).await?;
            let liked = thread.toggle_post_like().await?;
            println!("{}", if liked { "Liked" } else { "Unliked" });
        }
        Command::DeletePost { post_id } => {
            ctx.require_login()?;
            let thread = ctx.thread(post_id).await?;
            thread.delete_post().await?;
            println!("Post deleted");
        }
        Command::Comments { post_id, replies } => {
            let thread = ctx.loaded_thread(post_id, None).await?;
            if replies {
                for comment in thread.comments() {
                    if comment.replies_count > 0 {
                        thread.toggle_replies(comment.id).await?;
                    }
                }
            }
            print_thread(&thread);
        }
        Command::Comment { post_id, content } => {
            ctx.require_login()?;
            let thread = ctx.thread(post_id).await?;
            let comment = thread.submit_comment(&content, None).await?;
            println!("Commented #{}", comment.id);
        }
        Command::Reply {
            post_id,
            comment_id,
            content,
        } => {
            ctx.require_login()?;
            let thread = ctx.loaded_thread(post_id, None).await?;
            let reply = thread
                .submit_comment(&content, Some(CommentId(comment_id)))
                .await?;
            println!("Replied #{}", reply.id);
        }
        Command::Replies {
            post_id,
            comment_id,
        } => {
            let thread = ctx.loaded_thread(post_id, Some(comment_id)).await?;
            let now = Utc::now();
            for reply in thread.replies(CommentId(comment_id)).unwrap_or_default() {
                println!("{}", render_comment(&reply, now));
            }
        }
        Command::LikeComment {
            post_id,
            comment_id,
            parent,
        } => {
            ctx.require_login()?;
            let thread = ctx.loaded_thread(post_id, parent).await?;
            let liked = thread.toggle_like(CommentId(comment_id)).await?;
            println!("{}", if liked { "Liked" } else { "Unliked" });
        }
        Command::DeleteComment {
            post_id,
            comment_id,
            parent,
        } => {
            ctx.require_login()?;
            let thread = ctx.loaded_thread(post_id, parent).await?;
            thread.delete_comment(CommentId(comment_id)).await?;
            println!("Comment deleted");
        }
        Command::Likes { post_id, comment } => {
            let users = match comment {
                Some(comment_id) => ctx.client.comment_likes(CommentId(comment_id)).await?,
                None => ctx.client.post_likes(PostId(post_id)).await?,
            };
            if users.is_empty() {
                println!("No likes yet");
            }
            for user in users {
                println!("{}", user.display_name());
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file before clap reads them
    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    let settings = Settings::load()?;
    logging::init_logging(&log_config(&settings, cli.verbose))?;

    run(cli, settings).await
}
