//! CLI command implementations

use anyhow::{Result, anyhow, bail};
use colored::Colorize;
use filipa_core::{
    ConfigService, Database, ImportReport, Question, QuestionSetExport, QuestionType, Settings,
    Snapshot,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// What every command works against
pub struct Context {
    pub settings: Settings,
    pub settings_path: Option<PathBuf>,
    pub db: Database,
    pub json: bool,
}

impl Context {
    pub fn new(settings: Settings, settings_path: Option<PathBuf>, json: bool) -> Result<Self> {
        let db = Database::from_settings(&settings)?;
        Ok(Self {
            settings,
            settings_path,
            db,
            json,
        })
    }

    fn config_service(&self) -> ConfigService {
        ConfigService::new(&self.db, self.settings.bundled_config.clone())
    }
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Collection")]
    collection: String,
    #[tabled(rename = "Records")]
    records: usize,
}

#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Sessions")]
    sessions: usize,
    #[tabled(rename = "Created")]
    created: String,
}

#[derive(Tabled)]
struct QuestionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    question_type: String,
    #[tabled(rename = "Tags")]
    tags: String,
    #[tabled(rename = "Hash")]
    hash: String,
    #[tabled(rename = "Question")]
    question: String,
}

impl From<&Question> for QuestionRow {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            question_type: q.question_type.to_string(),
            tags: q.tags.join(", "),
            hash: q.hash.clone(),
            question: truncate(&q.question, 60),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

fn print_table<T: Tabled>(rows: Vec<T>) {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn confirm(warning: &str, json: bool) -> Result<bool> {
    if json {
        bail!("--yes is required with --json");
    }
    println!("{}", warning.red());
    print!("Continue? [y/N] ");
    std::io::Write::flush(&mut std::io::stdout())?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Write pretty JSON to `out`, or stdout without it
async fn emit_json<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    match out {
        Some(path) => tokio::fs::write(path, content).await?,
        None => print!("{content}"),
    }
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| anyhow!("Invalid JSON in {}: {}", path.display(), e))
}

fn print_report(report: &ImportReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    println!("{} Imported {} records", "✓".green(), report.total());
    for (collection, count) in &report.imported {
        println!("  {collection}: {count}");
    }
    for warning in &report.warnings {
        println!("{} {}: {}", "!".yellow(), warning.collection, warning.message);
    }
    Ok(())
}

pub async fn status(ctx: &Context) -> Result<()> {
    let store = ctx.db.open().await?;
    let names: Vec<String> = store.collection_names().map(str::to_string).collect();
    let mut counts = BTreeMap::new();
    for name in names {
        let count = store.count(&name).await?;
        counts.insert(name, count);
    }

    if ctx.json {
        let status = serde_json::json!({
            "dir": store.dir().display().to_string(),
            "version": store.version(),
            "collections": counts,
        });
        println!("{}", serde_json::to_string(&status)?);
    } else {
        println!("{} {}", "Store:".bold(), store.dir().display());
        println!("{} {}", "Schema version:".bold(), store.version());
        println!();
        let rows = counts
            .into_iter()
            .map(|(collection, records)| CountRow {
                collection,
                records,
            })
            .collect();
        print_table(rows);
    }
    Ok(())
}

pub async fn export(ctx: &Context, out: Option<PathBuf>) -> Result<()> {
    let snapshot = ctx.db.export_all().await?;
    emit_json(&snapshot, out.as_deref()).await?;

    if let Some(path) = out {
        let total: usize = snapshot.values().map(Vec::len).sum();
        eprintln!(
            "{} Exported {} records to {}",
            "✓".green(),
            total,
            path.display()
        );
    }
    Ok(())
}

pub async fn import(ctx: &Context, file: &Path) -> Result<()> {
    let snapshot: Snapshot = read_json(file).await?;
    let report = ctx.db.import_merge(snapshot).await?;
    print_report(&report, ctx.json)
}

pub async fn seed(ctx: &Context, file: &Path) -> Result<()> {
    let snapshot: Snapshot = read_json(file).await?;
    match ctx.db.seed_if_empty(snapshot).await? {
        Some(report) => print_report(&report, ctx.json),
        None => {
            if ctx.json {
                println!(r#"{{"seeded": false}}"#);
            } else {
                println!("Store already has data, nothing seeded");
            }
            Ok(())
        }
    }
}

pub async fn is_empty(ctx: &Context) -> Result<()> {
    let empty = ctx.db.is_empty().await?;
    if ctx.json {
        println!(r#"{{"empty": {}}}"#, empty);
    } else {
        println!("{}", empty);
    }
    Ok(())
}

pub async fn clear(ctx: &Context, yes: bool) -> Result<()> {
    let warning = "This deletes every candidate, session and question. The configuration is kept.";
    if !yes && !confirm(warning, ctx.json)? {
        println!("Aborted");
        return Ok(());
    }

    ctx.db.clear_all().await?;
    println!("{} Cleared all interview data", "✓".green());
    Ok(())
}

pub async fn reset(ctx: &Context, yes: bool) -> Result<()> {
    let warning = format!(
        "This deletes the whole store at {}, configuration included.",
        ctx.db.dir().display()
    );
    if !yes && !confirm(&warning, ctx.json)? {
        println!("Aborted");
        return Ok(());
    }

    ctx.db.reset().await?;
    println!("{} Removed {}", "✓".green(), ctx.db.dir().display());
    Ok(())
}

pub async fn candidates(ctx: &Context) -> Result<()> {
    let mut candidates = ctx.db.candidates().list().await?;
    candidates.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    if ctx.json {
        println!("{}", serde_json::to_string(&candidates)?);
        return Ok(());
    }
    if candidates.is_empty() {
        println!("No candidates found");
        return Ok(());
    }

    let sessions = ctx.db.sessions();
    let mut rows = Vec::with_capacity(candidates.len());
    for c in candidates {
        rows.push(CandidateRow {
            sessions: sessions.list_by_candidate(&c.id).await?.len(),
            created: c.created_at.format("%Y-%m-%d %H:%M").to_string(),
            name: c.display_name,
            id: c.id,
        });
    }
    print_table(rows);
    Ok(())
}

pub async fn export_candidate(ctx: &Context, id: &str, out: Option<PathBuf>) -> Result<()> {
    let export = ctx
        .db
        .export_candidate(id)
        .await?
        .ok_or_else(|| anyhow!("Candidate not found: {}", id))?;
    emit_json(&export, out.as_deref()).await?;

    if let Some(path) = out {
        eprintln!(
            "{} Exported {} ({} sessions) to {}",
            "✓".green(),
            export.candidate.display_name,
            export.sessions.len(),
            path.display()
        );
    }
    Ok(())
}

pub async fn questions(
    ctx: &Context,
    tag: Option<String>,
    question_type: Option<String>,
) -> Result<()> {
    let question_type: Option<QuestionType> = question_type.map(|t| t.parse()).transpose()?;
    let repo = ctx.db.questions();

    let mut questions = match (&tag, question_type) {
        (Some(tag), _) => repo.list_by_tag(tag).await?,
        (None, Some(t)) => repo.list_by_type(t).await?,
        (None, None) => repo.list().await?,
    };
    if let Some(t) = question_type {
        questions.retain(|q| q.question_type == t);
    }

    if ctx.json {
        println!("{}", serde_json::to_string(&questions)?);
    } else if questions.is_empty() {
        println!("No questions found");
    } else {
        print_table(questions.iter().map(QuestionRow::from).collect());
    }
    Ok(())
}

pub async fn duplicates(ctx: &Context) -> Result<()> {
    let mut groups: BTreeMap<String, Vec<Question>> = BTreeMap::new();
    for q in ctx.db.questions().list().await? {
        groups.entry(q.hash.clone()).or_default().push(q);
    }
    groups.retain(|_, qs| qs.len() > 1);

    if ctx.json {
        println!("{}", serde_json::to_string(&groups)?);
        return Ok(());
    }
    if groups.is_empty() {
        println!("{} No duplicate questions", "✓".green());
        return Ok(());
    }

    for (hash, questions) in &groups {
        println!(
            "{} {} ({} copies)",
            "hash".dimmed(),
            hash.cyan(),
            questions.len()
        );
        for q in questions {
            println!("  {} {}", q.id.dimmed(), truncate(&q.question, 70));
        }
    }
    Ok(())
}

pub async fn export_sets(ctx: &Context, ids: &[String], out: Option<PathBuf>) -> Result<()> {
    let export = ctx.db.export_question_sets(ids).await?;
    if !ids.is_empty() && export.question_sets.len() < ids.len() {
        eprintln!(
            "{} {} of {} question sets not found",
            "!".yellow(),
            ids.len() - export.question_sets.len(),
            ids.len()
        );
    }
    emit_json(&export, out.as_deref()).await?;

    if let Some(path) = out {
        eprintln!(
            "{} Exported {} question sets ({} questions) to {}",
            "✓".green(),
            export.question_sets.len(),
            export.questions.len(),
            path.display()
        );
    }
    Ok(())
}

pub async fn import_sets(ctx: &Context, file: &Path) -> Result<()> {
    let export: QuestionSetExport = read_json(file).await?;
    let report = ctx.db.import_question_sets(export).await?;
    print_report(&report, ctx.json)
}

pub async fn config_show(ctx: &Context) -> Result<()> {
    let config = ctx.config_service().load().await;
    if ctx.json {
        println!("{}", serde_json::to_string(&config)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&config)?);
    }
    Ok(())
}

pub async fn config_reset(ctx: &Context) -> Result<()> {
    ctx.config_service().reset().await?;
    println!("{} App configuration reset to defaults", "✓".green());
    Ok(())
}

pub fn config_path(ctx: &Context) -> Result<()> {
    let settings = ctx
        .settings_path
        .as_ref()
        .map(|p| p.display().to_string());
    let store = ctx.db.dir().display().to_string();

    if ctx.json {
        let paths = serde_json::json!({ "settings": settings, "store": store });
        println!("{}", serde_json::to_string(&paths)?);
    } else {
        match settings {
            Some(path) => println!("Settings: {}", path),
            None => println!("Settings: {}", "(none, using defaults)".dimmed()),
        }
        println!("Store:    {}", store);
    }
    Ok(())
}

pub fn settings() -> Result<()> {
    print!("{}", Settings::default_with_comments());
    Ok(())
}
