//! Model data sources - which input files a run needs and where they come from

use crate::core::config::ConfigError;
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

const CFSV2_PRESSURE_URL: &str =
    "https://nomads.ncdc.noaa.gov/modeldata/cfsv2_forecast_6-hourly_9mon_pgbf/";
const CFSV2_FLUX_URL: &str =
    "https://nomads.ncdc.noaa.gov/modeldata/cfsv2_forecast_6-hourly_9mon_flxf/";

/// One file to retrieve
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadItem {
    pub url: String,
    pub destination: PathBuf,
}

/// Supported model data sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelDataSource {
    #[serde(rename = "CFSv2")]
    Cfsv2,
}

impl ModelDataSource {
    /// Resolve the `modeldata` setting (case-insensitive)
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "cfsv2" => Ok(ModelDataSource::Cfsv2),
            _ => Err(ConfigError::UnknownModelData(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelDataSource::Cfsv2 => "CFSv2",
        }
    }

    /// Prefixes ungrib writes its intermediate files under, one ungrib pass each
    pub fn file_extensions(&self) -> &'static [&'static str] {
        match self {
            ModelDataSource::Cfsv2 => &["3D", "FLX"],
        }
    }

    /// Vtable for each entry of [`file_extensions`](Self::file_extensions)
    pub fn vtables(&self) -> &'static [&'static str] {
        match self {
            ModelDataSource::Cfsv2 => &["Vtable.CFSv2.3D", "Vtable.CFSv2.FLX"],
        }
    }

    /// Value of `fg_name` in the metgrid namelist
    pub fn fg_name(&self) -> &'static str {
        match self {
            ModelDataSource::Cfsv2 => "'3D', 'FLX'",
        }
    }

    /// Hours between consecutive input time stamps
    pub fn interval_hours(&self) -> i64 {
        match self {
            ModelDataSource::Cfsv2 => 6,
        }
    }

    /// Every file the run needs, from `start` to `end` inclusive
    pub fn download_plan(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        target_dir: &Path,
    ) -> Vec<DownloadItem> {
        let init = start.format("%Y%m%d%H").to_string();
        let mut items = Vec::new();
        let mut current = start;

        while current <= end {
            let stamp = current.format("%Y%m%d%H").to_string();
            match self {
                ModelDataSource::Cfsv2 => {
                    items.push(DownloadItem {
                        url: cfsv2_url(CFSV2_PRESSURE_URL, "pgbf", &init, &stamp),
                        destination: target_dir.join(format!("3D_{}.grb2", stamp)),
                    });
                    items.push(DownloadItem {
                        url: cfsv2_url(CFSV2_FLUX_URL, "flxf", &init, &stamp),
                        destination: target_dir.join(format!("flx_{}.grb2", stamp)),
                    });
                }
            }
            current += Duration::hours(self.interval_hours());
        }

        items
    }
}

impl fmt::Display for ModelDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `<base>/YYYY/YYYYMM/YYYYMMDD/YYYYMMDDHH/<kind><stamp>.01.<init>.grb2`
fn cfsv2_url(base: &str, kind: &str, init: &str, stamp: &str) -> String {
    format!(
        "{}{}/{}/{}/{}/{}{}.01.{}.grb2",
        base,
        &init[0..4],
        &init[0..6],
        &init[0..8],
        init,
        kind,
        stamp,
        init
    )
}
