//! CSV export of a finished run, kept on disk for audit and download.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use csv::{QuoteStyle, WriterBuilder};
use tracing::info;

use crate::errors::AppError;
use crate::models::job::JobPosting;

const HEADER: [&str; 17] = [
    "title",
    "company",
    "location",
    "site",
    "job_url",
    "description",
    "salary_min",
    "salary_max",
    "date_posted",
    "analyzed",
    "similarity_score",
    "similarity_explanation",
    "salary_min_extracted",
    "salary_max_extracted",
    "salary_confidence",
    "key_matches",
    "missing_requirements",
];

/// `jobs_<resume>[_<position>]_<YYYYmmdd_HHMMSS>.csv`.
///
/// Uploads are stored as `<prefix>_<name>.<ext>`; the prefix and extension
/// are dropped from `<resume>`. Both components are reduced to
/// `[A-Za-z0-9_-]` so the result is always a single path segment.
pub fn output_filename<Tz>(filename: &str, desired_position: Option<&str>, now: DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    let unprefixed = base.split_once('_').map_or(base, |(_, rest)| rest);
    let resume = Path::new(unprefixed)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(file_component)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "resume".to_string());

    let position = desired_position
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("_{}", file_component(p).to_lowercase()))
        .unwrap_or_default();

    format!("jobs_{resume}{position}_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

fn file_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Writes `jobs` under `dir` (created if missing) and returns the full path.
pub fn export_jobs(dir: &Path, file_name: &str, jobs: &[JobPosting]) -> Result<PathBuf, AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::Export(format!("creating {}: {e}", dir.display())))?;

    let path = dir.join(file_name);
    write_csv(&path, jobs)?;
    info!("Saved {} jobs to {}", jobs.len(), path.display());
    Ok(path)
}

/// Every field quoted, `\` as the escape character.
pub fn write_csv(path: &Path, jobs: &[JobPosting]) -> Result<(), AppError> {
    let export_err = |e: csv::Error| AppError::Export(format!("{}: {e}", path.display()));

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .double_quote(false)
        .escape(b'\\')
        .from_path(path)
        .map_err(export_err)?;

    writer.write_record(HEADER).map_err(export_err)?;
    for job in jobs {
        writer.write_record(record(job)).map_err(export_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::Export(format!("{}: {e}", path.display())))?;

    Ok(())
}

fn record(job: &JobPosting) -> Vec<String> {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let number = |v: Option<f64>| v.map(|n| n.to_string()).unwrap_or_default();
    let a = &job.analysis;

    vec![
        text(&job.title),
        text(&job.company),
        text(&job.location),
        text(&job.site),
        text(&job.job_url),
        text(&job.description),
        number(job.salary_min),
        number(job.salary_max),
        text(&job.date_posted),
        a.analyzed.to_string(),
        a.similarity_score.to_string(),
        a.similarity_explanation.clone(),
        number(a.salary_min_extracted),
        number(a.salary_max_extracted),
        a.salary_confidence.to_string(),
        a.key_matches.join("; "),
        a.missing_requirements.join("; "),
    ]
}
