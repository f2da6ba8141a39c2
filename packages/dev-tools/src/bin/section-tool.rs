//! Section Tool for Development
//!
//! Loads a course from a JSON data directory, applies one section operation
//! through the full controller (capabilities granted, session key verified)
//! and prints the resulting outline.
//!
//! # Usage
//!
//! ```bash
//! section-tool <data-dir> <course-id> init
//! section-tool <data-dir> <course-id> outline [--json]
//! section-tool <data-dir> <course-id> create <parent-id> [level]
//! section-tool <data-dir> <course-id> delete <id> [promote|cascade]
//! section-tool <data-dir> <course-id> hide <id>
//! section-tool <data-dir> <course-id> show <id>
//! section-tool <data-dir> <course-id> move <id> [parent=<id>] [after=<id>] [before=<id>] [level=<n>]
//! section-tool <data-dir> <course-id> rename <id> <name...>
//! ```
//!
//! # Configuration
//!
//! Reads the JSON file named by `MULTITOPIC_CONFIG` if set, otherwise the
//! `MULTITOPIC_*` environment variables. Log verbosity follows `RUST_LOG`
//! (default `info`).

use anyhow::{anyhow, bail, Context};
use multitopic_core::db::JsonFileSectionStore;
use multitopic_core::models::{ChildPolicy, MoveDestination, SectionUpdate};
use multitopic_core::services::{
    AllowAll, ControllerResponse, DeleteOutcome, RequestContext, SectionController,
};
use multitopic_core::TreeConfig;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

enum Command {
    Init,
    Outline { json: bool },
    Create { parent_id: i64, level: Option<u8> },
    Delete { id: i64, policy: Option<ChildPolicy> },
    Visibility { id: i64, visible: bool },
    Move { id: i64, dest: MoveDestination },
    Rename { id: i64, name: String },
}

fn parse_id(raw: Option<&String>, what: &str) -> anyhow::Result<i64> {
    let raw = raw.ok_or_else(|| anyhow!("missing {}", what))?;
    raw.parse()
        .with_context(|| format!("invalid {} {:?}", what, raw))
}

fn parse_command(args: &[String]) -> anyhow::Result<Command> {
    let name = args.first().map(String::as_str).unwrap_or("outline");
    let rest = args.get(1..).unwrap_or(&[]);

    Ok(match name {
        "init" => Command::Init,
        "outline" => Command::Outline {
            json: rest.iter().any(|a| a == "--json"),
        },
        "create" => Command::Create {
            parent_id: parse_id(rest.first(), "parent id")?,
            level: rest
                .get(1)
                .map(|l| l.parse::<u8>())
                .transpose()
                .context("invalid level")?,
        },
        "delete" => Command::Delete {
            id: parse_id(rest.first(), "section id")?,
            policy: match rest.get(1).map(String::as_str) {
                None => None,
                Some("promote") => Some(ChildPolicy::Promote),
                Some("cascade") => Some(ChildPolicy::Cascade),
                Some(other) => bail!("unknown child policy {:?}", other),
            },
        },
        "hide" | "show" => Command::Visibility {
            id: parse_id(rest.first(), "section id")?,
            visible: name == "show",
        },
        "move" => {
            let id = parse_id(rest.first(), "section id")?;
            let mut dest = MoveDestination::default();
            for arg in rest.iter().skip(1) {
                let (key, value) = arg
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected key=value, got {:?}", arg))?;
                match key {
                    "parent" => dest.parent_id = Some(value.parse().context("invalid parent")?),
                    "after" => dest.prev_sibling_id = Some(value.parse().context("invalid after")?),
                    "before" => dest.next_sibling_id = Some(value.parse().context("invalid before")?),
                    "level" => dest.level = Some(value.parse().context("invalid level")?),
                    other => bail!("unknown move option {:?}", other),
                }
            }
            Command::Move { id, dest }
        }
        "rename" => Command::Rename {
            id: parse_id(rest.first(), "section id")?,
            name: rest.get(1..).unwrap_or(&[]).join(" "),
        },
        other => bail!("unknown command {:?}", other),
    })
}

fn load_config() -> anyhow::Result<TreeConfig> {
    match std::env::var("MULTITOPIC_CONFIG") {
        Ok(path) => TreeConfig::from_file(path),
        Err(_) => TreeConfig::from_env(),
    }
}

/// Print a notice and report whether the operation went through
fn report<T>(response: ControllerResponse<T>) -> Option<T> {
    match response {
        ControllerResponse::Done(value) => Some(value),
        ControllerResponse::Notice(notice) => {
            eprintln!("⚠️  {} ({})", notice.message, notice.code);
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("usage: section-tool <data-dir> <course-id> <command> [args...]");
    }
    let data_dir = &args[0];
    let course_id: i64 = args[1]
        .parse()
        .with_context(|| format!("invalid course id {:?}", args[1]))?;
    let command = parse_command(&args[2..])?;

    let config = load_config()?;
    let store = JsonFileSectionStore::open(data_dir).await?;
    let controller = SectionController::new(Arc::new(store), Arc::new(AllowAll), &config)?;
    let ctx = RequestContext::new("section-tool", course_id).with_session_key(true);
    tracing::debug!("Request {} against course {}", ctx.request_id, course_id);

    match command {
        Command::Init => {
            let root = controller.ensure_root(&ctx).await?;
            println!("✅ General section {}", root.id);
        }
        Command::Outline { json: true } => {
            let rows = controller.outline(&ctx).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }
        Command::Outline { json: false } => {}
        Command::Create { parent_id, level } => {
            if let Some(section) = report(controller.create_section(&ctx, parent_id, level).await?) {
                println!("✅ Created section {} at level {}", section.id, section.level);
            }
        }
        Command::Delete { id, policy } => {
            match report(controller.delete_section(&ctx, id, true, policy).await?) {
                Some(DeleteOutcome::Deleted {
                    removed_ids,
                    redirect_target_id,
                }) => println!(
                    "✅ Removed {:?}, continue at section {}",
                    removed_ids, redirect_target_id
                ),
                Some(DeleteOutcome::NeedsConfirmation { display_name, .. }) => {
                    println!("Delete of {:?} needs confirmation", display_name)
                }
                None => {}
            }
        }
        Command::Visibility { id, visible } => {
            if let Some(section) = report(controller.set_visibility(&ctx, id, visible).await?) {
                println!("✅ Section {} visible={}", section.id, section.visible);
            }
        }
        Command::Move { id, dest } => {
            if let Some(section) = report(controller.move_section(&ctx, id, dest).await?) {
                println!(
                    "✅ Section {} now at ordinal {} (level {})",
                    section.id, section.ordinal, section.level
                );
            }
        }
        Command::Rename { id, name } => {
            let update = SectionUpdate {
                name: Some(Some(name)),
                ..SectionUpdate::default()
            };
            if let Some(section) = report(controller.update_section(&ctx, id, update).await?) {
                println!("✅ Section {} renamed", section.id);
            }
        }
    }

    for row in controller.outline(&ctx).await? {
        println!(
            "{:>3}  {}{}{}",
            row.ordinal,
            "  ".repeat(row.level as usize),
            row.display_name,
            if row.effectively_visible { "" } else { "  (hidden)" }
        );
    }
    Ok(())
}
