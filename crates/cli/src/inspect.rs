use shadejar_core::classify;
use shadejar_ingest::ArchiveReader;
use std::collections::BTreeMap;
use std::path::Path;
use tabled::{Table, Tabled, settings::Style};

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Class")]
    tag: &'static str,
    #[tabled(rename = "Size")]
    size: String,
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / 1024.0 / 1024.0)
    }
}

fn rows(archive: &Path) -> Result<Vec<EntryRow>, Box<dyn std::error::Error>> {
    let mut rows = Vec::new();
    for entry in ArchiveReader::open(archive)? {
        let entry = entry?;
        rows.push(EntryRow {
            tag: classify(&entry.path).as_str(),
            size: format_size(entry.size),
            path: entry.path,
        });
    }
    Ok(rows)
}

pub fn run(archive: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let rows = rows(archive)?;
    if rows.is_empty() {
        println!("{} has no entries.", archive.display());
        return Ok(());
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in &rows {
        *counts.entry(row.tag).or_default() += 1;
    }
    println!("{}", Table::new(&rows).with(Style::psql()));
    println!();
    for (tag, count) in counts {
        println!("  {}: {}", tag, count);
    }
    Ok(())
}
