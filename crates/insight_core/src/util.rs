use anyhow::Result;
use directories::ProjectDirs;
use std::{env, path::PathBuf};

pub fn app_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "Insight", "Insight")
        .ok_or_else(|| anyhow::anyhow!("ProjectDirs unavailable"))
}

/// Resolve the dataset directory: INSIGHT_DATA_DIR override first, then the
/// conventional ./data/sales_data, then the per-user data dir.
pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(custom) = env::var("INSIGHT_DATA_DIR") {
        return Ok(PathBuf::from(custom));
    }
    let local = PathBuf::from("data/sales_data");
    if local.is_dir() {
        return Ok(local);
    }
    let pd = app_dirs()?;
    Ok(pd.data_dir().join("sales_data"))
}
