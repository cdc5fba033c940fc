use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::state::AppState;
use crate::repositories::summaries;

/// Writes the current school-wide summary as a CSV snapshot. Each run
/// overwrites the previous snapshot so the file always reflects the latest
/// reconciliation pass.
pub(crate) async fn export_school_summary(state: &AppState) -> Result<PathBuf> {
    let summary = summaries::school(state).await.context("load school summary")?;

    let mut csv = String::from("department,tested_count,total_score,average,ge90,ge75,ge60\n");
    for dept in &summary.departments {
        csv.push_str(&format!(
            "{},{},{},{:.2},{},{},{}\n",
            dept.department,
            dept.tested_count,
            dept.total_score,
            dept.average,
            dept.ge90,
            dept.ge75,
            dept.ge60,
        ));
    }
    csv.push_str(&format!(
        "school,{},{},{:.2},{},{},{}\n",
        summary.tested_count,
        summary.total_score,
        summary.average,
        summary.ge90,
        summary.ge75,
        summary.ge60,
    ));

    let dir = PathBuf::from(&state.settings().contest().reports_dir);
    tokio::fs::create_dir_all(&dir).await.context("create reports directory")?;
    let path = dir.join("school_summary.csv");
    tokio::fs::write(&path, csv.as_bytes())
        .await
        .with_context(|| format!("write report to {}", path.display()))?;

    tracing::debug!(path = %path.display(), "school summary report written");
    Ok(path)
}
