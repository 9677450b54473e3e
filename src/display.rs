use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

use crate::roster::{Participant, Roster};
use crate::schedule::republish::ChangeReport;
use crate::schedule::types::{Allocation, Group, Member};

/// Which sheet header to print
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    Fresh,
    Updated,
    Swapped,
}

/// Everything rendering needs besides the groups
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    pub title: &'a str,
    pub play_day: Weekday,
    pub generated_at: NaiveDateTime,
}

impl RenderContext<'_> {
    /// The next `play_day` on or after the generation date
    pub fn play_date(&self) -> NaiveDate {
        let today = self.generated_at.date();
        let ahead = (7 + self.play_day.num_days_from_monday() as i64
            - today.weekday().num_days_from_monday() as i64)
            % 7;
        today + Duration::days(ahead)
    }

    fn header(&self, kind: SheetKind) -> String {
        let title = self.title.to_uppercase();
        match kind {
            SheetKind::Fresh => format!("*{} TEE SHEET*", title),
            SheetKind::Updated => format!("*{} TEE SHEET (UPDATED)*", title),
            SheetKind::Swapped => format!("*{} TEE SHEET (SWAPPED)*", title),
        }
    }

    fn date_lines(&self) -> String {
        format!(
            "{}\nGenerated: {}",
            self.play_date().format("%A %d/%m/%Y"),
            self.generated_at.format("%a %d/%m at %H:%M")
        )
    }
}

/// Formats a sheet member, flagging guests with their host
pub fn format_member(member: &Member) -> String {
    match &member.host {
        Some(host) => format!("{} (guest of {})", member.name, host),
        None => member.name.clone(),
    }
}

fn push_groups(lines: &mut Vec<String>, groups: &[Group]) {
    for (i, group) in groups.iter().enumerate() {
        lines.push(String::new());
        lines.push(format!("*Group {} - {}*", i + 1, group.slot_label()));
        for member in &group.members {
            lines.push(format!("  - {}", format_member(member)));
        }
    }
}

fn count_line(groups: &[Group]) -> String {
    let players: usize = groups.iter().map(Group::len).sum();
    format!("{} players, {} groups", players, groups.len())
}

/// Renders a freshly generated allocation
pub fn render_allocation(allocation: &Allocation, ctx: &RenderContext) -> String {
    let mut lines = vec![ctx.header(SheetKind::Fresh), ctx.date_lines(), count_line(&allocation.groups)];
    if !allocation.returnable_slots.is_empty() {
        lines.push(format!(
            "{} tee time(s) can be returned: {}",
            allocation.returnable_slots.len(),
            allocation.returnable_slots.join(", ")
        ));
    }
    push_groups(&mut lines, &allocation.groups);
    lines.join("\n")
}

/// Renders a published sheet after minimal edits, with a change line
pub fn render_adjusted(groups: &[Group], kind: SheetKind, changes: &str, ctx: &RenderContext) -> String {
    let mut lines = vec![ctx.header(kind), ctx.date_lines(), count_line(groups)];
    if !changes.is_empty() {
        lines.push(format!("Changes: {}", changes));
    }
    push_groups(&mut lines, groups);
    lines.join("\n")
}

/// `render_adjusted` for a diff report
pub fn render_report(groups: &[Group], report: &ChangeReport, ctx: &RenderContext) -> String {
    render_adjusted(groups, SheetKind::Updated, &report.summary(), ctx)
}

fn format_participant(p: &Participant) -> String {
    let mut line = p.name.clone();
    let guests = p.guest_labels();
    if !guests.is_empty() {
        line.push_str(&format!(" (bringing: {})", guests.join(", ")));
    }
    if let Some(pref) = p.preference {
        line.push_str(&format!(" - {}", pref));
    }
    line
}

/// Playing list with a capacity line and numbered reserves
pub fn render_participant_list(roster: &Roster, capacity: usize, title: &str) -> String {
    let header = format!("*{} Update*", title);
    let playing = roster.playing();
    let reserves = roster.reserves();
    if playing.is_empty() && reserves.is_empty() {
        return format!("{}\n\nNo names in yet.", header);
    }

    let filled = roster.spots_used();
    let mut lines = vec![header];
    if filled < capacity {
        lines.push(format!(
            "{}/{} spots filled ({} spaces left)",
            filled,
            capacity,
            capacity - filled
        ));
    } else {
        lines.push(format!("{}/{} spots filled - *FULL*", filled, capacity));
    }

    for p in &playing {
        lines.push(format!("- {}", format_participant(p)));
    }
    if !reserves.is_empty() {
        lines.push(String::new());
        lines.push(format!("*Reserves* ({}):", reserves.len()));
        for (i, p) in reserves.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, format_participant(p)));
        }
    }
    lines.join("\n")
}

/// Writes a rendered sheet to a file
pub fn write_sheet_to_file(rendered: &str, path: impl AsRef<Path>) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{}", rendered)?;
    Ok(())
}
