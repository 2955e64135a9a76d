//! Plain-text rendering of a loaded score.
//!
//! This is the library-side of the CLI binaries: a summary of the session
//! and totals, top-N tables per category, and an indented timeline dump.
//! Graphical front-ends render the same queries their own way.

use std::io::{self, Write};

use num_format::{Buffer, Locale};

use crate::score::data::{CompileValue, ScoreData};
use crate::score::timeline::{Timeline, TimelineNode};
use crate::score::Category;

/// What [`write_summary`] should include.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// How many values to list per category table.
    pub top: usize,
    /// Restrict the value tables to one category.
    pub category: Option<Category>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            top: 10,
            category: None,
        }
    }
}

/// Formats a microsecond duration the way the tables display it.
pub fn format_duration(us: u64) -> String {
    if us >= 60_000_000 {
        let minutes = us / 60_000_000;
        let seconds = (us % 60_000_000) as f64 / 1_000_000.0;
        format!("{}m {:.2}s", minutes, seconds)
    } else if us >= 1_000_000 {
        format!("{:.3}s", us as f64 / 1_000_000.0)
    } else if us >= 1_000 {
        format!("{:.2}ms", us as f64 / 1_000.0)
    } else {
        format!("{}us", us)
    }
}

fn group(n: u64) -> Buffer {
    let mut buffer = Buffer::default();
    let _ = buffer.write_formatted(&n, &Locale::en);
    buffer
}

/// Writes the session header, per-category totals and top-N value tables.
pub fn write_summary<W: Write>(
    data: &ScoreData,
    opt: &ReportOptions,
    mut writer: W,
) -> io::Result<()> {
    let session = &data.session;
    writeln!(
        writer,
        "format v{} | units {} | threads {} | duration {}",
        session.version,
        group(data.units().len() as u64).as_str(),
        session.num_threads,
        format_duration(session.total_duration)
    )?;

    writeln!(writer)?;
    writeln!(writer, "totals")?;
    for category in Category::all().take(Category::DISPLAY) {
        let total = match data.total(category) {
            Some(total) if total.total > 0 => total,
            _ => continue,
        };
        writeln!(
            writer,
            "  {:<24} {:>14} {:>7.1}%",
            category.label(),
            format_duration(total.total),
            total.ratio * 100.0
        )?;
    }

    for category in Category::all().take(Category::GATHER) {
        if let Some(only) = opt.category {
            if only != category {
                continue;
            }
        }
        let dataset = match data.dataset(category) {
            Some(dataset) if !dataset.is_empty() => dataset,
            _ => continue,
        };

        let mut ranked: Vec<&CompileValue> = dataset.values.iter().collect();
        ranked.sort_unstable_by(|a, b| b.max.cmp(&a.max));

        writeln!(writer)?;
        writeln!(
            writer,
            "{} ({} values)",
            category.label(),
            group(dataset.len() as u64).as_str()
        )?;
        let mut itoa_buffer = itoa::Buffer::new();
        for value in ranked.into_iter().take(opt.top) {
            writeln!(
                writer,
                "  [{}] {:<48} max {:>12} avg {:>12} x{}",
                itoa_buffer.format(value.severity),
                value.name,
                format_duration(u64::from(value.max)),
                format_duration(value.average()),
                group(u64::from(value.count)).as_str()
            )?;
        }
    }
    Ok(())
}

/// Writes a reconstructed timeline as an indented tree.
pub fn write_timeline<W: Write>(timeline: &Timeline, mut writer: W) -> io::Result<()> {
    writeln!(
        writer,
        "{} | span {} | depth {}",
        timeline.root.label,
        format_duration(u64::from(timeline.root.duration)),
        timeline.max_depth()
    )?;
    for child in &timeline.root.children {
        write_timeline_node(child, &mut writer)?;
    }
    Ok(())
}

fn write_timeline_node<W: Write>(node: &TimelineNode, writer: &mut W) -> io::Result<()> {
    writeln!(
        writer,
        "{:indent$}{} [{}] +{} {}",
        "",
        node.label,
        node.category.label(),
        node.start,
        format_duration(u64::from(node.duration)),
        indent = (node.depth as usize + 1) * 2
    )?;
    for child in &node.children {
        write_timeline_node(child, writer)?;
    }
    Ok(())
}
