use anyhow::Result;
use comfy_table::{Cell, Color};
use matchpack_core::curation::{ClusterUpdate, MergeRequest};
use matchpack_core::domain::{Cluster, Decision};
use matchpack_core::Curator;

use super::output::{id_list, print_json, short_id, table};

fn decision_color(decision: Decision) -> Color {
    match decision {
        Decision::Approved => Color::Green,
        Decision::Rejected => Color::Red,
        Decision::NeedsReview => Color::Yellow,
        Decision::Pending => Color::Reset,
    }
}

fn cover_label(cluster: &Cluster) -> String {
    match &cluster.cover {
        Some(cover) if !cover.is_empty() => id_list(cover.face_ids()),
        _ => "auto".to_string(),
    }
}

pub fn list(curator: &Curator, match_id: &str, json: bool) -> Result<()> {
    let clusters = curator.clusters(match_id)?;
    if json {
        return print_json(&clusters);
    }
    if clusters.is_empty() {
        println!("No clusters for this match. Run `matchpack generate {match_id}` first.");
        return Ok(());
    }

    let mut t = table(&["ID", "Decision", "Faces", "Cover"]);
    for cluster in &clusters {
        t.add_row(vec![
            Cell::new(&cluster.id),
            Cell::new(cluster.decision).fg(decision_color(cluster.decision)),
            Cell::new(cluster.member_ids.len()),
            Cell::new(cover_label(cluster)),
        ]);
    }
    println!("{t}");
    Ok(())
}

pub fn faces(curator: &Curator, match_id: &str, cluster_id: &str, json: bool) -> Result<()> {
    let faces = curator.cluster_faces(match_id, cluster_id)?;
    if json {
        return print_json(&faces);
    }

    let mut t = table(&["Face", "Photo", "Score", "Blur", "Faces in photo", "Embedding"]);
    for face in &faces {
        t.add_row(vec![
            Cell::new(&face.id),
            Cell::new(short_id(&face.photo_id)),
            Cell::new(format!("{:.3}", face.score)),
            Cell::new(format!("{:.1}", face.blur_score)),
            Cell::new(face.face_count),
            Cell::new(face.embedding.as_ref().map_or("-".to_string(), |e| e.len().to_string())),
        ]);
    }
    println!("{t}");
    Ok(())
}

pub fn decide(curator: &mut Curator, cluster_id: &str, decision: Decision) -> Result<()> {
    let update = ClusterUpdate {
        decision: Some(decision),
        covers: None,
    };
    let cluster = curator.update_cluster(cluster_id, &update)?;
    println!("Cluster {} is now {}", cluster.id, cluster.decision);
    Ok(())
}

pub fn covers(curator: &mut Curator, cluster_id: &str, faces: Vec<String>) -> Result<()> {
    let update = ClusterUpdate {
        decision: None,
        covers: Some(faces),
    };
    let cluster = curator.update_cluster(cluster_id, &update)?;
    println!("Cluster {} cover: {}", cluster.id, cover_label(&cluster));
    Ok(())
}

pub fn suggest(curator: &Curator, cluster_id: &str, json: bool) -> Result<()> {
    let suggested = curator.suggest_covers(cluster_id)?;
    let effective = curator.effective_covers(cluster_id)?;
    if json {
        return print_json(&serde_json::json!({
            "suggested": suggested,
            "effective": effective,
        }));
    }
    println!("Suggested: {}", id_list(&suggested));
    println!("Effective: {}", id_list(&effective));
    Ok(())
}

pub fn merge(
    curator: &mut Curator,
    match_id: &str,
    sources: Vec<String>,
    into: Option<String>,
    json: bool,
) -> Result<()> {
    let mut request = MergeRequest::new(sources);
    if let Some(target) = into {
        request = request.into_target(target);
    }
    let outcome = curator.merge_clusters(match_id, &request)?;
    if json {
        return print_json(&outcome);
    }
    if outcome.absorbed.is_empty() {
        println!("Nothing to merge; {} unchanged.", outcome.target);
    } else {
        println!(
            "Merged {} cluster(s) into {} ({} faces moved)",
            outcome.absorbed.len(),
            outcome.target,
            outcome.faces_moved
        );
    }
    Ok(())
}

pub fn detach(curator: &mut Curator, match_id: &str, cluster_id: &str, face_id: &str) -> Result<()> {
    let remaining = curator.detach_face(match_id, cluster_id, face_id)?;
    println!(
        "Detached {face_id} from {cluster_id} ({} faces remain)",
        remaining.len()
    );
    Ok(())
}

pub fn generate(curator: &mut Curator, match_id: &str) -> Result<()> {
    let count = curator.generate_clusters(match_id)?;
    println!("Clustering produced {count} cluster(s).");
    Ok(())
}
