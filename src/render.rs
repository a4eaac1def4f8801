use owo_colors::{OwoColorize, Rgb};
use std::io::{self, Write};

use crate::archive::EntryKind;
use crate::explore::{FileRow, LayerListing};
use crate::history::HistoryReport;
use crate::layers::{ContentStats, LayerReport};
use crate::theme::Theme;
use crate::whiteout::Deletion;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub use_color: bool,
    pub theme: Theme,
}

impl RenderOptions {
    fn paint(&self, text: &str, color: Rgb) -> String {
        if self.use_color {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

pub fn render_layers<W: Write + ?Sized>(
    writer: &mut W,
    report: &LayerReport,
    options: &RenderOptions,
) -> io::Result<()> {
    let theme = &options.theme;
    writeln!(
        writer,
        "Image {} contains {} layers:",
        report.reference, report.layer_count
    )?;

    for layer in &report.layers {
        writeln!(
            writer,
            "  {} Layer {} : {} ({})",
            options.paint("•", theme.layer_marker),
            layer.ordinal,
            options.paint(&layer.digest, theme.digest),
            options.paint(&format!("{:.2} MB", megabytes(layer.size)), theme.size),
        )?;
        if let Some(media_type) = &layer.media_type {
            writeln!(writer, "      {}", options.paint(media_type, theme.muted))?;
        }
        if let Some(stats) = &layer.contents {
            writeln!(writer, "      {}", content_summary(stats))?;
        }
    }

    writeln!(
        writer,
        "Total size (compressed): {:.2} MB",
        megabytes(report.total_size)
    )
}

fn content_summary(stats: &ContentStats) -> String {
    let mut summary = format!(
        "{} files, {} directories, {} symlinks, {} whiteouts, {:.2} MB uncompressed",
        stats.files,
        stats.directories,
        stats.symlinks,
        stats.whiteouts,
        megabytes(stats.bytes)
    );
    if stats.other > 0 {
        summary.push_str(&format!(", {} other", stats.other));
    }
    if stats.interrupted {
        summary.push_str(" (archive ended early)");
    }
    summary
}

pub fn render_history<W: Write + ?Sized>(
    writer: &mut W,
    report: &HistoryReport,
    options: &RenderOptions,
) -> io::Result<()> {
    let theme = &options.theme;

    for step in &report.steps {
        // "•" marks steps that produced a real layer
        let marker = if step.produced_layer {
            options.paint("•", theme.layer_marker)
        } else {
            " ".to_string()
        };
        let command = if step.command.is_empty() {
            options.paint("(no command)", theme.muted)
        } else {
            step.command.clone()
        };
        writeln!(writer, "[{:02}] {} {}", step.ordinal, marker, command)?;

        if let Some(layer) = &step.layer {
            writeln!(
                writer,
                "\t↳ Layer {} {} ({})",
                layer.ordinal,
                options.paint(&layer.digest, theme.digest),
                options.paint(&format!("{:.2} MB", megabytes(layer.size)), theme.size),
            )?;
        }
    }

    writeln!(
        writer,
        "Total size (compressed): {:.2} MB",
        megabytes(report.total_size)
    )?;

    if let Some(mismatch) = &report.mismatch {
        writeln!(writer, "{}", options.paint(&format!("warning: {mismatch}"), theme.warning))?;
    }
    Ok(())
}

pub fn render_listing<W: Write + ?Sized>(
    writer: &mut W,
    listing: &LayerListing,
    options: &RenderOptions,
) -> io::Result<()> {
    let theme = &options.theme;
    writeln!(
        writer,
        "Content of layer #{} of {}:",
        listing.ordinal, listing.reference
    )?;

    for row in &listing.rows {
        // Pad before coloring so escape codes don't skew the columns
        let mode = format!("{:<10}", format_mode(row.mode, row.kind));
        let size = format!("{:>8}", row.size);
        write!(
            writer,
            "{} {}  {}",
            options.paint(&mode, theme.permissions),
            options.paint(&size, theme.size),
            paint_name(row, options)
        )?;

        match (row.kind, &row.link_target) {
            (EntryKind::Symlink, Some(target)) => {
                write!(writer, " -> {}", options.paint(target, theme.symlink))?
            }
            (EntryKind::HardLink, Some(target)) => {
                write!(writer, " => {}", options.paint(target, theme.hardlink))?
            }
            _ => {}
        }
        writeln!(writer)?;
    }

    if listing.rows.is_empty() {
        writeln!(writer, "(No files found in this layer)")?;
    }

    if !listing.deletions.is_empty() {
        writeln!(writer, "Deleted by this layer:")?;
        for deletion in &listing.deletions {
            let text = match deletion {
                Deletion::Path(path) => path.clone(),
                Deletion::Opaque(dir) => format!("{dir}/* (opaque)"),
            };
            writeln!(writer, "  - {}", options.paint(&text, theme.muted))?;
        }
    }

    if let Some(reason) = &listing.interruption {
        let warning = format!("warning: layer archive ended early: {reason}");
        writeln!(writer, "{}", options.paint(&warning, theme.warning))?;
    }
    Ok(())
}

fn paint_name(row: &FileRow, options: &RenderOptions) -> String {
    let theme = &options.theme;
    let color = match row.kind {
        EntryKind::Directory => Some(theme.directory),
        EntryKind::Symlink => Some(theme.symlink),
        EntryKind::HardLink => Some(theme.hardlink),
        EntryKind::Regular if row.mode & 0o111 != 0 => Some(theme.executable),
        _ => None,
    };

    match color {
        Some(color) => options.paint(&row.path, color),
        None => row.path.clone(),
    }
}

/// `ls -l` style mode string, e.g. `drwxr-xr-x` or `-rwsr-xr-x`.
pub fn format_mode(mode: u32, kind: EntryKind) -> String {
    let file_type = match kind {
        EntryKind::Directory => 'd',
        EntryKind::Symlink => 'l',
        EntryKind::CharDevice => 'c',
        EntryKind::BlockDevice => 'b',
        EntryKind::Fifo => 'p',
        _ => '-',
    };

    // (read, write, execute, special bit, special char)
    let classes = [
        (0o400, 0o200, 0o100, 0o4000, 's'),
        (0o040, 0o020, 0o010, 0o2000, 's'),
        (0o004, 0o002, 0o001, 0o1000, 't'),
    ];

    let mut out = String::with_capacity(10);
    out.push(file_type);
    for (read, write, exec, special, special_char) in classes {
        out.push(if mode & read != 0 { 'r' } else { '-' });
        out.push(if mode & write != 0 { 'w' } else { '-' });
        out.push(match (mode & exec != 0, mode & special != 0) {
            (true, true) => special_char,
            (false, true) => special_char.to_ascii_uppercase(),
            (true, false) => 'x',
            (false, false) => '-',
        });
    }
    out
}
