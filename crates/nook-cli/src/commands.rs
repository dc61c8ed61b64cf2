use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use colored::Colorize;
use nook_feed::{FeedAssembler, FeedConfig, FeedError, FeedFilter, PostView};
use nook_store::{encode_post, InMemoryDocumentStore, POSTS_COLLECTION};
use nook_types::{
    AuthorSnapshot, Comment, CommentId, MediaAttachment, MediaKind, Post, PostId, UserId,
    Visibility,
};
use tracing::info;

use crate::cli::*;

const DEMO_AUTHORS: [(&str, &str, &str); 4] = [
    ("u-ada", "Ada Park", "ada"),
    ("u-bo", "Bo Lindqvist", "bo"),
    ("u-cy", "Cy Okafor", "cy"),
    ("u-dee", "Dee Santos", "dee"),
];

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    if let Command::Config = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let store = Arc::new(InMemoryDocumentStore::new());
    seed_store(&store, cli.posts)?;
    let feed = FeedAssembler::new(store.clone(), viewer(), config)?;
    info!(posts = cli.posts, "demo backend seeded");

    match cli.command {
        Command::Feed(args) => cmd_feed(&feed, args, &cli.format).await,
        Command::Like(args) => cmd_like(&feed, args, &cli.format).await,
        Command::Comment(args) => cmd_comment(&feed, args, &cli.format).await,
        Command::Trending(args) => cmd_trending(&feed, args, &cli.format).await,
        Command::Simulate(args) => cmd_simulate(&feed, &store, args).await,
        Command::Config => Ok(()),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<FeedConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            FeedConfig::from_toml_str(&text)?
        }
        None => FeedConfig::default(),
    };
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }
    config.validate()?;
    Ok(config)
}

fn viewer() -> AuthorSnapshot {
    AuthorSnapshot::new("u-me", "You", "you")
}

/// Fill the store with `n` posts, newest first by index, with a mix of
/// visibilities, media, likes and comments.
fn seed_store(store: &InMemoryDocumentStore, n: usize) -> anyhow::Result<()> {
    let now = Utc::now();
    for i in 0..n {
        let (id, name, username) = DEMO_AUTHORS[i % DEMO_AUTHORS.len()];
        let author = AuthorSnapshot::new(id, name, username)
            .with_avatar(format!("https://avatars.example/{username}.png"));
        let body = if i % 5 == 0 {
            let walk = "a long walk along the river this morning. ".repeat(5);
            format!("Post {i}: {walk}")
        } else {
            format!("Post {i} from {name}")
        };

        let created = now - Duration::minutes(i as i64 * 7);
        let mut post = Post::new(PostId::new(format!("post-{i:03}")), author, body, created);
        if i % 4 == 3 {
            post.visibility = Visibility::Friends;
        }
        if i % 3 == 0 {
            post.media.push(MediaAttachment {
                url: format!("https://media.example/{i}.jpg"),
                kind: MediaKind::Image,
            });
        }
        for (liker, _, _) in DEMO_AUTHORS.iter().take(i % DEMO_AUTHORS.len()) {
            post.likes.insert((*liker).into());
        }
        if i % 2 == 0 {
            let (cid, cname, cuser) = DEMO_AUTHORS[(i + 1) % DEMO_AUTHORS.len()];
            post.comments.push(Comment {
                id: CommentId::generate(),
                author: AuthorSnapshot::new(cid, cname, cuser),
                body: "Nice one".into(),
                created_at: created + Duration::minutes(2),
            });
        }

        store.insert(POSTS_COLLECTION, post.id.as_str(), encode_post(&post)?);
    }
    Ok(())
}

async fn cmd_feed(
    feed: &FeedAssembler,
    args: FeedArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let filter = feed_filter(&args)?;
    let first = feed.load_initial(&filter).await?;
    let mut cursor = first.cursor;
    for _ in 1..args.pages {
        let Some(next) = cursor.take() else { break };
        match feed.load_more(&next).await {
            Ok(page) => cursor = page.cursor,
            Err(FeedError::ExhaustedCursor) => break,
            Err(e) => return Err(e.into()),
        }
    }

    let views = feed.view();
    print_views(&views, format)?;
    if matches!(format, OutputFormat::Text) {
        let more = if feed.cursor().is_some() {
            "more available"
        } else {
            "end of feed"
        };
        println!(
            "\n{} posts loaded, {}",
            views.len().to_string().bold(),
            more.dimmed()
        );
    }
    Ok(())
}

fn feed_filter(args: &FeedArgs) -> anyhow::Result<FeedFilter> {
    let mut filter = match &args.author {
        Some(author) => FeedFilter::by_author(UserId::parse(author)?, Vec::new()),
        None => FeedFilter::home(),
    };
    if !args.visibility.is_empty() {
        filter.visibility = args
            .visibility
            .iter()
            .map(|v| v.parse::<Visibility>())
            .collect::<Result<_, _>>()?;
    } else if filter.author.is_some() {
        filter.visibility = vec![Visibility::Public];
    }
    Ok(filter)
}

async fn cmd_like(
    feed: &FeedAssembler,
    args: LikeArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let post_id = PostId::parse(&args.post)?;
    feed.load_initial(&FeedFilter::home()).await?;
    if args.undo {
        feed.unlike(&post_id).await?;
    } else {
        feed.like(&post_id).await?;
    }
    print_post(feed, &post_id, format)
}

async fn cmd_comment(
    feed: &FeedAssembler,
    args: CommentArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let post_id = PostId::parse(&args.post)?;
    feed.load_initial(&FeedFilter::home()).await?;
    let comment_id = feed.comment(&post_id, &args.text).await?;
    if matches!(format, OutputFormat::Text) {
        println!(
            "{} Comment {} posted",
            "✓".green().bold(),
            comment_id.to_string().cyan()
        );
    }
    print_post(feed, &post_id, format)
}

async fn cmd_trending(
    feed: &FeedAssembler,
    args: TrendingArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let views = feed.trending(args.limit).await?;
    if matches!(format, OutputFormat::Text) {
        println!("{} Most liked public posts", "→".cyan());
    }
    print_views(&views, format)
}

async fn cmd_simulate(
    feed: &FeedAssembler,
    store: &InMemoryDocumentStore,
    args: SimulateArgs,
) -> anyhow::Result<()> {
    let page = feed.load_initial(&FeedFilter::home()).await?;
    let post_id = match args.post {
        Some(raw) => PostId::parse(&raw)?,
        None => page
            .posts
            .first()
            .map(|p| p.id.clone())
            .context("the seeded feed is empty")?,
    };
    println!(
        "{} Loaded {} posts; acting on {}",
        "→".cyan(),
        page.len(),
        post_id.to_string().yellow()
    );

    store.fail_next_writes(1);
    match feed.like(&post_id).await {
        Err(e) => println!(
            "{} Like failed and was rolled back: {}",
            "✗".red().bold(),
            e
        ),
        Ok(()) => println!("{} Like unexpectedly succeeded", "!".yellow()),
    }
    print_post(feed, &post_id, &OutputFormat::Text)?;

    feed.like(&post_id).await?;
    println!("{} Like retried and confirmed", "✓".green().bold());
    print_post(feed, &post_id, &OutputFormat::Text)?;

    store.time_out_next_writes(1);
    if let Err(e) = feed.comment(&post_id, "Is this thing on?").await {
        println!(
            "{} Comment failed and was rolled back: {}",
            "✗".red().bold(),
            e
        );
    }
    let id = feed.comment(&post_id, "Is this thing on?").await?;
    println!(
        "{} Comment confirmed as {}",
        "✓".green().bold(),
        id.to_string().cyan()
    );

    feed.refresh(&FeedFilter::home()).await?;
    print_post(feed, &post_id, &OutputFormat::Text)?;

    let failures = feed.take_failures();
    if failures.is_empty() {
        println!("{} No mutations expired", "✓".green());
    }
    for failure in failures {
        println!("{} {}", "✗".red(), failure.error);
    }
    Ok(())
}

fn print_post(
    feed: &FeedAssembler,
    post_id: &PostId,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let views: Vec<PostView> = feed
        .view()
        .into_iter()
        .filter(|v| &v.post.id == post_id)
        .collect();
    print_views(&views, format)
}

fn print_views(views: &[PostView], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(views)?),
        OutputFormat::Text => views.iter().for_each(print_card),
    }
    Ok(())
}

fn print_card(view: &PostView) {
    let post = &view.post;
    println!(
        "{}  {} {}  {}",
        post.id.to_string().yellow(),
        post.author.display_name.bold(),
        format!("@{}", post.author.username).dimmed(),
        post.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
    );
    println!("  {}", view.preview);
    if !post.media.is_empty() {
        println!("  {}", format!("[{} attachment(s)]", post.media.len()).blue());
    }

    let heart = if view.liked_by_viewer {
        "♥".red()
    } else {
        "♡".normal()
    };
    let mut line = format!(
        "  {heart} {}   comments {}",
        view.like_count, view.comment_count
    );
    if view.like_pending || view.comment_pending {
        line.push_str(&format!("  {}", "sending…".dimmed()));
    }
    println!("{line}");
}
