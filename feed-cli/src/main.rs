mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use feed_client::{
    ClientConfig, Credentials, FeedClient, FeedClientError, FeedController, FeedFilter, FeedQuery,
    FeedSnapshot, ImageUpload, NewPost, Ordering, PageOutcome, Post, PostDetail, ProfilePatch,
    Registration, SessionStatus, User,
};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Service base URL, e.g. http://127.0.0.1:8000/api
    #[arg(short, long)]
    server: Option<String>,

    /// Directory holding the persisted tokens
    #[arg(long)]
    token_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Register {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        #[arg(long)]
        password_confirm: String,

        #[arg(long)]
        bio: Option<String>,
    },

    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    Logout,

    Status,

    /// Show the profile, or update it when any field is given
    Profile {
        #[arg(short, long)]
        username: Option<String>,

        #[arg(short, long)]
        email: Option<String>,

        #[arg(short, long)]
        bio: Option<String>,
    },

    Feed {
        #[arg(short, long, default_value = "")]
        search: String,

        #[arg(short, long, default_value = "")]
        author: String,

        /// -created_at, created_at, title or -title
        #[arg(short, long, default_value_t = Ordering::NewestFirst)]
        ordering: Ordering,

        /// Number of pages to follow
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },

    /// Interactive search: each stdin line is the new search text.
    /// `:author NAME`, `:order ORDERING`, `:more` and `:quit` are commands.
    Search {
        #[arg(short, long, default_value = "")]
        author: String,

        #[arg(short, long, default_value_t = Ordering::NewestFirst)]
        ordering: Ordering,
    },

    Show {
        #[arg(short, long)]
        id: i64,
    },

    Like {
        #[arg(short, long)]
        id: i64,
    },

    Comment {
        #[arg(short, long)]
        id: i64,

        #[arg(short, long)]
        text: String,
    },

    Delete {
        #[arg(short, long)]
        id: i64,
    },

    Create {
        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        body: String,

        #[arg(long)]
        image: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();

    let mut config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => fail(&format!("Invalid configuration: {}", e)),
    };
    if let Some(server) = cli.server {
        config = config.with_base_url(server);
    }
    if let Some(dir) = cli.token_dir {
        config = config.with_token_dir(dir);
    }

    let client = match FeedClient::new(config) {
        Ok(client) => client,
        Err(e) => fail(&format!("Invalid configuration: {}", e)),
    };
    tracing::debug!("Using service at {}", client.config().base_url);

    let status = client.session().restore().await;
    tracing::debug!("Session status after restore: {:?}", status);

    match cli.command {
        Commands::Register {
            username,
            email,
            password,
            password_confirm,
            bio,
        } => {
            println!("📝 Registering user: {}", username);

            let registration = Registration {
                username,
                email,
                password,
                password_confirm,
                bio,
            };
            match client.session().register(registration).await {
                Ok(user) => {
                    println!("{}", "✅ Registration successful!".green());
                    print_user(&user);
                }
                Err(e) => report("Registration failed", &e),
            }
        }

        Commands::Login { email, password } => {
            println!("🔑 Logging in as: {}", email);

            match client.session().login(Credentials { email, password }).await {
                Ok(user) => {
                    println!("{}", "✅ Login successful!".green());
                    print_user(&user);
                    println!(
                        "   Tokens saved to {:?}",
                        client.config().token_dir
                    );
                }
                Err(e) => report("Login failed", &e),
            }
        }

        Commands::Logout => {
            client.session().logout().await;
            println!("{}", "👋 Logged out".green());
        }

        Commands::Status => match client.session().state().current_user().await {
            Some(user) if status == SessionStatus::Authenticated => {
                println!("🔑 Logged in");
                print_user(&user);
            }
            _ => {
                println!("{}", "❌ Not logged in".yellow());
                println!("   Please login first: feed-cli login --email <email> --password <password>");
            }
        },

        Commands::Profile {
            username,
            email,
            bio,
        } => {
            let patch = ProfilePatch {
                username,
                email,
                bio,
            };
            let result = if patch.is_empty() {
                client.session().refresh_identity().await
            } else {
                client.session().update_identity(patch).await
            };
            match result {
                Ok(user) => print_user(&user),
                Err(e) => report("Failed to load profile", &e),
            }
        }

        Commands::Feed {
            search,
            author,
            ordering,
            pages,
        } => {
            let query = FeedQuery::new(search, FeedFilter { author, ordering });
            if let Err(e) = client.feed().set_query(query).await {
                report("Failed to load feed", &e);
            }
            for _ in 1..pages {
                match client.feed().load_next_page().await {
                    Ok(PageOutcome::EndOfFeed) => break,
                    Ok(_) => {}
                    Err(e) => report("Failed to load next page", &e),
                }
            }
            print_feed(&client.feed().snapshot().await);
        }

        Commands::Search { author, ordering } => {
            live_search(&client, FeedFilter { author, ordering }).await?;
        }

        Commands::Show { id } => match client.feed().open_post(id).await {
            Ok(detail) => print_detail(&detail),
            Err(e) => report(&format!("Failed to load post #{}", id), &e),
        },

        Commands::Like { id } => match client.mutations().toggle_like(id).await {
            Ok(like) => {
                let verb = if like.is_liked { "Liked" } else { "Unliked" };
                println!(
                    "{} post #{} ({} likes)",
                    format!("❤️ {}", verb).green(),
                    id,
                    like.likes_count
                );
            }
            Err(e) => report(&format!("Failed to like post #{}", id), &e),
        },

        Commands::Comment { id, text } => match client.mutations().add_comment(id, &text).await {
            Ok(comment) => {
                println!("{}", "✅ Comment added".green());
                println!("   ID: {}", comment.id);
                println!("   {}", comment.body);
            }
            Err(e) => report("Failed to add comment", &e),
        },

        Commands::Delete { id } => {
            println!("🗑️ Deleting post #{}", id);

            // so the author check can run locally
            if client.session().state().is_authenticated().await {
                if let Err(e) = client.feed().open_post(id).await {
                    report(&format!("Failed to load post #{}", id), &e);
                }
            }
            match client.mutations().delete_post(id).await {
                Ok(()) => println!("{}", "✅ Post deleted successfully!".green()),
                Err(e) => report("Failed to delete post", &e),
            }
        }

        Commands::Create { title, body, image } => {
            println!("📝 Creating new post...");

            let image = match image {
                Some(path) => Some(read_image(&path)?),
                None => None,
            };
            match client
                .mutations()
                .create_post(NewPost { title, body, image })
                .await
            {
                Ok(post) => {
                    println!("{}", "✅ Post created successfully!".green());
                    print_post(1, &post);
                }
                Err(e) => report("Failed to create post", &e),
            }
        }
    }

    Ok(())
}

async fn live_search(client: &FeedClient, mut filter: FeedFilter) -> Result<()> {
    match client.feed().set_query(FeedQuery::new("", filter.clone())).await {
        Ok(_) => print_feed(&client.feed().snapshot().await),
        Err(e) => eprintln!("{} {}", "❌ Failed to load feed:".red(), e),
    }

    let mut settled = client.feed().subscribe();
    let (debouncer, follower) = client.spawn_debouncer().await;
    let mut printed = client.feed().snapshot().await.generation;
    let mut quit = false;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let line = line.trim_end();
                if line == ":quit" {
                    quit = true;
                    break;
                } else if line == ":more" {
                    match client.feed().load_next_page().await {
                        Ok(PageOutcome::Appended(_)) => print_feed(&client.feed().snapshot().await),
                        Ok(PageOutcome::EndOfFeed) => println!("   End of feed"),
                        Ok(PageOutcome::Stale) => {}
                        Err(e) => eprintln!("{} {}", "❌ Failed to load next page:".red(), e),
                    }
                } else if let Some(author) = line.strip_prefix(":author") {
                    filter.author = author.trim().to_string();
                    debouncer.filter(filter.clone());
                } else if let Some(ordering) = line.strip_prefix(":order") {
                    match ordering.trim().parse::<Ordering>() {
                        Ok(ordering) => {
                            filter.ordering = ordering;
                            debouncer.filter(filter.clone());
                        }
                        Err(e) => eprintln!("{} {}", "❌".red(), e),
                    }
                } else {
                    debouncer.search(line);
                }
            }
            Ok(()) = settled.changed() => {
                let generation = *settled.borrow_and_update();
                if print_settled(client.feed(), generation).await {
                    printed = generation;
                }
            }
        }
    }

    drop(debouncer);
    follower.await.context("Search task failed")?;
    if quit {
        return Ok(());
    }

    // input ended: show the last query once its fetch settles
    let latest = client.feed().snapshot().await.generation;
    if printed != latest && settled.wait_for(|g| *g == latest).await.is_ok() {
        print_settled(client.feed(), latest).await;
    }
    Ok(())
}

/// Prints the feed if `generation` is still the current one.
async fn print_settled(feed: &FeedController, generation: u64) -> bool {
    let snapshot = feed.snapshot().await;
    if snapshot.generation != generation {
        return false;
    }
    match &snapshot.last_error {
        Some(e) => eprintln!("{} {}", "❌ Failed to load feed:".red(), e),
        None => print_feed(&snapshot),
    }
    true
}

fn read_image(path: &Path) -> Result<ImageUpload> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(ImageUpload { file_name, bytes })
}

fn report(action: &str, e: &FeedClientError) -> ! {
    if e.is_auth_expired() {
        fail("Session expired. Please login again: feed-cli login --email <email> --password <password>");
    } else if matches!(e, FeedClientError::AuthRequired) {
        fail("Unauthorized. Please login first: feed-cli login --email <email> --password <password>");
    } else if e.is_not_found() {
        fail(&format!("{}: not found", action));
    } else if e.is_unauthorized() {
        fail(&format!("{}: not allowed ({})", action, e));
    } else {
        fail(&format!("{}: {}", action, e));
    }
}

fn fail(message: &str) -> ! {
    println!("{} {}", "❌".red(), message.red());
    std::process::exit(1);
}

fn print_user(user: &User) {
    println!("   User ID: {}", user.id);
    println!("   Username: {}", user.display_name());
    println!("   Email: {}", user.email);
    if let Some(bio) = &user.bio {
        println!("   Bio: {}", bio);
    }
    println!("   Posts: {}", user.posts_count);
    println!("   Joined: {}", user.joined_at.format("%Y-%m-%d"));
}

fn print_feed(snapshot: &FeedSnapshot) {
    println!(
        "{}",
        format!(
            "✅ Showing {} of {} posts",
            snapshot.posts.len(),
            snapshot.cursor.total_count
        )
        .green()
    );
    println!();

    if snapshot.posts.is_empty() {
        println!("   No posts found");
        return;
    }
    for (i, post) in snapshot.posts.iter().enumerate() {
        print_post(i + 1, post);
    }
    if snapshot.cursor.has_next() {
        println!("   More posts available");
    }
}

fn print_post(n: usize, post: &Post) {
    let heart = if post.is_liked_by_current_user { "♥" } else { "♡" };
    println!("   {}. [{}] {}", n, post.id, post.title.bold());
    println!(
        "      by {} on {}",
        post.author.display_name(),
        post.created_at.format("%Y-%m-%d %H:%M")
    );
    if !post.body.is_empty() {
        println!("      {}", truncate(&post.body, 60));
    }
    println!(
        "      {} {}   💬 {}",
        heart, post.likes_count, post.comments_count
    );
    println!();
}

fn print_detail(detail: &PostDetail) {
    let post = &detail.post;
    print_post(1, post);
    if !post.body.is_empty() {
        println!("{}", post.body);
        println!();
    }
    if let Some(image) = &post.image_ref {
        println!("   Image: {}", image);
    }
    if detail.comments.is_empty() {
        println!("   No comments yet");
    }
    for comment in &detail.comments {
        println!(
            "   {} ({}): {}",
            comment.author.display_name().cyan(),
            comment.created_at.format("%Y-%m-%d %H:%M"),
            comment.body
        );
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
