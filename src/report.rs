//! Per-epoch CSV run report

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::format_description;

use crate::error::Result;
use crate::meta::{EpochEnd, EpochStart, EpochStats};

const HEADER: &str =
    "epoch,meta_epoch,size,capacity,alpha,learning_rate,mean_reward,mean_makespan,loss,aggregated";

/// One report row, assembled from the epoch events and the inner-loop stats
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub epoch: usize,
    pub meta_epoch: usize,
    pub size: usize,
    pub capacity: Option<u32>,
    pub alpha: f32,
    pub learning_rate: f64,
    pub mean_reward: f32,
    pub mean_makespan: f32,
    pub loss: f32,
    pub aggregated: bool,
}

impl ReportRow {
    pub fn new(start: &EpochStart, stats: &EpochStats, end: &EpochEnd) -> Self {
        Self {
            epoch: start.epoch,
            meta_epoch: start.meta_epoch,
            size: start.task.size,
            capacity: start.capacity,
            alpha: start.alpha,
            learning_rate: start.learning_rate,
            mean_reward: stats.mean_reward,
            mean_makespan: stats.mean_makespan,
            loss: stats.loss,
            aggregated: end.aggregated,
        }
    }

    fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{:.6},{:.6e},{:.4},{:.4},{:.6},{}",
            self.epoch,
            self.meta_epoch,
            self.size,
            self.capacity.map(|c| c.to_string()).unwrap_or_default(),
            self.alpha,
            self.learning_rate,
            self.mean_reward,
            self.mean_makespan,
            self.loss,
            self.aggregated
        )
    }
}

/// CSV file named `metaco - <YYYYMMDD-HHMMSS>.csv` in the reports folder
pub struct RunReport {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunReport {
    pub fn new(reports_folder: impl AsRef<Path>) -> Result<Self> {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let format = format_description::parse("[year][month][day]-[hour][minute][second]")
            .map_err(io::Error::other)?;
        let date_time_str = now.format(&format).map_err(io::Error::other)?;

        let path = reports_folder
            .as_ref()
            .join(format!("metaco - {date_time_str}.csv"));
        Self::create(path)
    }

    /// Create a report at an explicit path
    pub fn create(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{HEADER}")?;
        tracing::info!("Writing run report to {}", path.display());
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, row: &ReportRow) -> Result<()> {
        writeln!(self.writer, "{}", row.to_csv())?;
        self.writer.flush()?;
        Ok(())
    }
}
