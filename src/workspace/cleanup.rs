//! Cleanup profiles - which run artifacts are purged at each point of a run

use crate::workspace::{matching_entries, RunDirs};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Groups of run artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupCategory {
    /// Program logs and scheduler stdout files
    OutLogs,
    /// rsl.error files and scheduler stderr files
    ErrorLogs,
    /// Intermediate files, staged tables and executables
    StagedInputs,
    /// wrfout / wrfrst
    ModelOutput,
    /// The downloaded model data directory
    ModelData,
}

/// Where a cleanup pattern is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Run,
    Output,
}

const OUT_LOGS: &[(Location, &str)] = &[
    (Location::Run, "geogrid.log.*"),
    (Location::Run, "metgrid.log.*"),
    (Location::Run, "ungrib.log*"),
    (Location::Run, "ungrib.out"),
    (Location::Output, "rsl.out.*"),
    (Location::Run, "GEOGRID.o*"),
    (Location::Run, "METGRID.o*"),
    (Location::Run, "UNGRIB.o*"),
    (Location::Output, "REAL.o*"),
    (Location::Output, "WRF.o*"),
];

const ERROR_LOGS: &[(Location, &str)] = &[
    (Location::Output, "rsl.error.*"),
    (Location::Run, "GEOGRID.e*"),
    (Location::Run, "METGRID.e*"),
    (Location::Run, "UNGRIB.e*"),
    (Location::Output, "REAL.e*"),
    (Location::Output, "WRF.e*"),
];

const STAGED_INPUTS: &[(Location, &str)] = &[
    (Location::Run, "GRIBFILE.*"),
    (Location::Run, "3D:*"),
    (Location::Run, "FLX:*"),
    (Location::Output, "FILE:*"),
    (Location::Output, "met_em*"),
    (Location::Output, "wrfinput*"),
    (Location::Output, "wrfbdy*"),
    (Location::Output, "geo_em.d01.nc"),
    (Location::Output, "aero*"),
    (Location::Output, "bulk*"),
    (Location::Output, "CAM*"),
    (Location::Output, "capacity.asc"),
    (Location::Output, "CCN*"),
    (Location::Output, "CLM*"),
    (Location::Output, "co2_trans"),
    (Location::Output, "coeff*"),
    (Location::Output, "constants.asc"),
    (Location::Output, "create_p3_lookupTable_1.f90"),
    (Location::Output, "ETA*"),
    (Location::Output, "GEN*"),
    (Location::Output, "grib*"),
    (Location::Output, "kernels*"),
    (Location::Output, "LANDUSE.TBL"),
    (Location::Output, "masses.asc"),
    (Location::Output, "MPTABLE.TBL"),
    (Location::Output, "ozone*"),
    (Location::Output, "p3_lookup_table_1.dat"),
    (Location::Output, "RRTM*"),
    (Location::Output, "SOILPARM.TBL"),
    (Location::Output, "termvels.asc"),
    (Location::Output, "tr*"),
    (Location::Output, "URB*"),
    (Location::Output, "VEG*"),
    (Location::Output, "wind-turbine-1.tbl"),
    (Location::Output, "real.exe"),
    (Location::Output, "tc.exe"),
    (Location::Output, "wrf.exe"),
];

const MODEL_OUTPUT: &[(Location, &str)] = &[
    (Location::Output, "wrfout*"),
    (Location::Output, "wrfrst*"),
];

impl CleanupCategory {
    fn patterns(&self) -> &'static [(Location, &'static str)] {
        match self {
            CleanupCategory::OutLogs => OUT_LOGS,
            CleanupCategory::ErrorLogs => ERROR_LOGS,
            CleanupCategory::StagedInputs => STAGED_INPUTS,
            CleanupCategory::ModelOutput => MODEL_OUTPUT,
            CleanupCategory::ModelData => &[],
        }
    }
}

/// A named set of artifact categories to purge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupProfile {
    pub name: &'static str,
    pub categories: &'static [CleanupCategory],
}

impl CleanupProfile {
    /// Start of a run: leftovers of a previous run in the same directories
    pub const PRE_RUN: CleanupProfile = CleanupProfile {
        name: "pre_run",
        categories: &[
            CleanupCategory::OutLogs,
            CleanupCategory::ErrorLogs,
            CleanupCategory::StagedInputs,
            CleanupCategory::ModelOutput,
        ],
    };

    /// After a fatal stage outcome; error logs and model data stay for diagnosis
    pub const FATAL: CleanupProfile = CleanupProfile {
        name: "fatal",
        categories: &[
            CleanupCategory::OutLogs,
            CleanupCategory::StagedInputs,
            CleanupCategory::ModelOutput,
        ],
    };

    /// After a completed run; model output is kept
    pub const SUCCESS: CleanupProfile = CleanupProfile {
        name: "success",
        categories: &[
            CleanupCategory::OutLogs,
            CleanupCategory::ErrorLogs,
            CleanupCategory::StagedInputs,
            CleanupCategory::ModelData,
        ],
    };

    pub fn includes(&self, category: CleanupCategory) -> bool {
        self.categories.contains(&category)
    }
}

/// Trait for cleanup - best effort, never fails the caller
pub trait Cleaner: Send + Sync {
    fn clean(&self, profile: &CleanupProfile);
}

/// Deletes run artifacts from the filesystem
#[derive(Debug, Clone)]
pub struct FsCleaner {
    dirs: RunDirs,
    /// Only log what would be removed
    dry_run: bool,
}

impl FsCleaner {
    pub fn new(dirs: RunDirs) -> Self {
        Self {
            dirs,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Every path the profile would remove right now
    pub fn targets(&self, profile: &CleanupProfile) -> Vec<PathBuf> {
        let mut targets = Vec::new();
        for category in profile.categories {
            for (location, pattern) in category.patterns() {
                let dir = match location {
                    Location::Run => &self.dirs.run_dir,
                    Location::Output => &self.dirs.output_dir,
                };
                match matching_entries(dir, pattern) {
                    Ok(found) => targets.extend(found),
                    Err(e) => warn!("Skipping cleanup pattern {}: {}", pattern, e),
                }
            }
            if *category == CleanupCategory::ModelData && self.dirs.model_data_dir.exists() {
                targets.push(self.dirs.model_data_dir.clone());
            }
        }
        targets
    }

    fn remove(&self, path: &Path) {
        if self.dry_run {
            info!("Would remove {}", path.display());
            return;
        }
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        match result {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

impl Cleaner for FsCleaner {
    fn clean(&self, profile: &CleanupProfile) {
        let targets = self.targets(profile);
        info!(
            profile = profile.name,
            "Cleaning {} file(s) from {}",
            targets.len(),
            self.dirs.run_dir.display()
        );
        for path in &targets {
            self.remove(path);
        }
    }
}
