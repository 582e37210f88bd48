use std::fmt::Display;
use std::io::{self, Write};

use anyhow::{Result, bail};
use crossterm::style::{Color, Stylize};
use tabwriter::TabWriter;

// ---------------------------------------------------------------------------
// Colours
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Banner,
    Info,
    Ok,
    Warn,
    Error,
    Step,
    Highlight,
}

#[derive(Debug)]
pub struct Palette {
    pub banner: Color,
    pub info: Color,
    pub ok: Color,
    pub warn: Color,
    pub error: Color,
    pub step: Color,
    pub highlight: Color,
}

impl Palette {
    pub fn color(&self, tone: Tone) -> Color {
        match tone {
            Tone::Banner => self.banner,
            Tone::Info => self.info,
            Tone::Ok => self.ok,
            Tone::Warn => self.warn,
            Tone::Error => self.error,
            Tone::Step => self.step,
            Tone::Highlight => self.highlight,
        }
    }
}

pub static PALETTE: Palette = Palette {
    banner: Color::DarkCyan,
    info: Color::DarkBlue,
    ok: Color::DarkGreen,
    warn: Color::Yellow,
    error: Color::DarkRed,
    step: Color::DarkCyan,
    highlight: Color::DarkMagenta,
};

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// Progress and result messages. Everything but errors goes to stdout and is
/// dropped in quiet mode; errors always reach stderr.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    palette: &'static Palette,
    quiet: bool,
}

impl Console {
    pub fn new(palette: &'static Palette, quiet: bool) -> Self {
        Console { palette, quiet }
    }

    /// Console that prints nothing but errors. Used in tests.
    pub fn silent() -> Self {
        Console::new(&PALETTE, true)
    }

    pub fn paint(&self, tone: Tone, text: impl Display) -> String {
        format!("{}", text.to_string().with(self.palette.color(tone)))
    }

    pub fn say(&self, tone: Tone, text: impl Display) {
        if !self.quiet {
            println!("{}", self.paint(tone, text));
        }
    }

    pub fn banner(&self, msg: impl Display) {
        self.say(Tone::Banner, format!("[START] {}", msg));
    }

    pub fn info(&self, msg: impl Display) {
        self.say(Tone::Info, format!("[INFO] {}", msg));
    }

    pub fn ok(&self, msg: impl Display) {
        self.say(Tone::Ok, format!("[OK] {}", msg));
    }

    pub fn warn(&self, msg: impl Display) {
        self.say(Tone::Warn, format!("[WARN] {}", msg));
    }

    /// `[TAG] msg` in the step colour, for actions being taken.
    pub fn step(&self, tag: &str, msg: impl Display) {
        self.say(Tone::Step, format!("[{}] {}", tag, msg));
    }

    pub fn error(&self, msg: impl Display) {
        eprintln!("{}", self.paint(Tone::Error, format!("[ERROR] {}", msg)));
    }

    pub fn item(&self, msg: impl Display) {
        self.plain(format!("   - {}", msg));
    }

    pub fn plain(&self, text: impl Display) {
        if !self.quiet {
            println!("{}", text);
        }
    }

    pub fn blank(&self) {
        self.plain("");
    }

    /// Where live command output should be echoed.
    pub fn sink(&self) -> Box<dyn Write> {
        if self.quiet {
            Box::new(io::sink())
        } else {
            Box::new(io::stdout())
        }
    }
}

// ---------------------------------------------------------------------------
// Table helper
// ---------------------------------------------------------------------------

pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    dest: Box<dyn Write>,
}

impl Table {
    pub fn new(w: Box<dyn Write>, headers: Vec<String>) -> Self {
        Table {
            headers,
            rows: Vec::new(),
            dest: w,
        }
    }

    pub fn add_row(&mut self, columns: Vec<String>) -> Result<()> {
        if columns.len() != self.headers.len() {
            bail!(
                "row has {} columns, expected {}",
                columns.len(),
                self.headers.len()
            );
        }
        self.rows.push(columns);
        Ok(())
    }

    pub fn render(&mut self) -> Result<()> {
        if self.headers.is_empty() {
            return Ok(());
        }

        let buf = render_buf(&self.headers, &self.rows)?;
        self.dest.write_all(&buf)?;
        self.dest.flush()?;
        Ok(())
    }
}

fn render_buf(headers: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>> {
    let mut tw = TabWriter::new(Vec::new()).minwidth(0).padding(2);

    let upper: Vec<String> = headers.iter().map(|h| h.to_uppercase()).collect();
    writeln!(tw, "   {}", upper.join("\t"))?;

    for row in rows {
        writeln!(tw, "   {}", row.join("\t"))?;
    }

    tw.flush()?;
    Ok(tw.into_inner()?)
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// Pushed after the large file was moved to LFS.
    Recovered,
    Failed(String),
}

impl PushOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, PushOutcome::Failed(_))
    }

    pub fn label(&self) -> String {
        match self {
            PushOutcome::Pushed => "pushed".into(),
            PushOutcome::Recovered => "pushed (LFS applied)".into(),
            PushOutcome::Failed(reason) => format!("failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushRow {
    pub branch: String,
    pub outcome: PushOutcome,
}

pub fn format_push_tally(rows: &[PushRow]) -> String {
    let ok = rows.iter().filter(|r| r.outcome.succeeded()).count();
    format!("pushed {}/{} branch(es)", ok, rows.len())
}

pub fn render_push_summary(console: &Console, rows: &[PushRow]) -> Result<()> {
    let failed: Vec<&PushRow> = rows.iter().filter(|r| !r.outcome.succeeded()).collect();
    console.blank();
    if !failed.is_empty() {
        console.warn("these branches were not pushed:");
        for r in &failed {
            console.item(&r.branch);
        }
    }
    console.say(Tone::Highlight, "[SUMMARY] push results:");
    let mut table = Table::new(
        console.sink(),
        vec!["Branch".to_string(), "Result".to_string()],
    );
    for r in rows {
        table.add_row(vec![r.branch.clone(), r.outcome.label()])?;
    }
    table.render()?;
    let tally = format_push_tally(rows);
    if failed.is_empty() {
        console.ok(tally);
    } else {
        console.warn(tally);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullSummary {
    pub current_branch: String,
    pub local_branches: Option<usize>,
    pub remote_branches: Option<usize>,
    pub tags: Option<usize>,
    pub latest_commit: Option<String>,
}

fn count_or_unknown(n: Option<usize>) -> String {
    n.map(|n| n.to_string()).unwrap_or_else(|| "unknown".into())
}

pub fn render_pull_summary(console: &Console, s: &PullSummary) -> Result<()> {
    console.say(Tone::Highlight, "[SUMMARY] sync summary:");
    let current = if s.current_branch.is_empty() {
        "(detached HEAD)".to_string()
    } else {
        s.current_branch.clone()
    };
    let mut table = Table::new(console.sink(), vec!["Item".to_string(), "Value".to_string()]);
    table.add_row(vec!["current branch".into(), current])?;
    table.add_row(vec!["local branches".into(), count_or_unknown(s.local_branches)])?;
    table.add_row(vec!["remote branches".into(), count_or_unknown(s.remote_branches)])?;
    table.add_row(vec!["tags".into(), count_or_unknown(s.tags)])?;
    table.add_row(vec![
        "latest commit".into(),
        s.latest_commit.clone().unwrap_or_else(|| "no commits".into()),
    ])?;
    table.render()
}

/// Describes how the tag count moved across a tag fetch.
pub fn format_tag_delta(before: usize, after: usize) -> String {
    match after.cmp(&before) {
        std::cmp::Ordering::Equal => "tags are up to date".into(),
        std::cmp::Ordering::Greater => format!("fetched {} new tag(s)", after - before),
        std::cmp::Ordering::Less => format!("removed {} deleted tag(s)", before - after),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
