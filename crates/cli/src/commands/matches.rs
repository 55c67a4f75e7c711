use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;
use matchpack_core::Curator;

use super::output::{format_timestamp, print_json, table};

pub fn create(curator: &Curator, title: &str, date: NaiveDate, json: bool) -> Result<()> {
    let m = curator.create_match(title, date)?;
    if json {
        return print_json(&m);
    }
    println!("Created match {} ({} on {})", m.id, m.title, m.date);
    Ok(())
}

pub fn list(curator: &Curator, json: bool) -> Result<()> {
    let matches = curator.matches()?;
    if json {
        return print_json(&matches);
    }
    if matches.is_empty() {
        println!("No matches yet. Use `matchpack match create <title> <date>` to add one.");
        return Ok(());
    }

    let mut t = table(&["ID", "Title", "Date", "Status", "Created"]);
    for m in &matches {
        t.add_row(vec![
            Cell::new(&m.id),
            Cell::new(&m.title),
            Cell::new(m.date),
            Cell::new(m.status),
            Cell::new(format_timestamp(m.created_at)),
        ]);
    }
    println!("{t}");
    Ok(())
}

pub fn show(curator: &Curator, match_id: &str, json: bool) -> Result<()> {
    let m = curator.get_match(match_id)?;
    let summary = curator.summary(match_id)?;
    if json {
        return print_json(&serde_json::json!({ "match": m, "summary": summary }));
    }

    println!();
    println!("  {} ({})", m.title, m.date);
    println!("  {}", "=".repeat(m.title.len() + 13));
    println!("   Status:   {:>8}", m.status);
    println!("   Photos:   {:>8}", summary.photos);
    println!("   Faces:    {:>8}", summary.faces);
    println!("   Clusters: {:>8}        Approved: {}", summary.clusters, summary.approved);
    println!();
    Ok(())
}

pub fn review(curator: &Curator, match_id: &str) -> Result<()> {
    let previous = curator.mark_reviewed(match_id)?;
    println!("Match {match_id}: {previous} -> reviewed");
    Ok(())
}
