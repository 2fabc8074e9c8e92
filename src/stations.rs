//! Tuner position to station mapping.
//!
//! The directory is an ordered list of inclusive ranges; the first range
//! containing the tuner value wins. It is only ever replaced as a whole so
//! the control loop never sees a half-edited list.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::StationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRange {
    pub min: f64,
    pub max: f64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl StationRange {
    pub fn new(min: f64, max: f64, url: impl Into<String>) -> Self {
        StationRange { min, max, url: url.into(), title: None }
    }

    pub fn contains(&self, tuner: f64) -> bool {
        tuner >= self.min && tuner <= self.max
    }

    pub fn validate(&self) -> Result<(), StationError> {
        let in_scale = |v: f64| (0.0..=100.0).contains(&v);
        if !in_scale(self.min) || !in_scale(self.max) || self.min > self.max || self.url.trim().is_empty() {
            return Err(StationError::InvalidRange {
                min: self.min,
                max: self.max,
                url: self.url.clone(),
            });
        }
        Ok(())
    }

    fn overlaps(&self, other: &StationRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

/// Both the wrapped form written by `save` and a bare array are accepted.
#[derive(Deserialize)]
#[serde(untagged)]
enum StationFile {
    Wrapped { stations: Vec<StationRange> },
    Bare(Vec<StationRange>),
}

#[derive(Serialize)]
struct StationFileOut<'a> {
    stations: &'a [StationRange],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationDirectory {
    stations: Vec<StationRange>,
}

impl StationDirectory {
    /// Build a directory, rejecting any invalid range.
    pub fn new(stations: Vec<StationRange>) -> Result<Self, StationError> {
        for station in &stations {
            station.validate()?;
        }
        Ok(StationDirectory { stations })
    }

    pub fn empty() -> Self {
        StationDirectory::default()
    }

    /// First station whose inclusive range contains `tuner`.
    pub fn lookup(&self, tuner: f64) -> Option<&StationRange> {
        self.stations.iter().find(|s| s.contains(tuner))
    }

    pub fn lookup_url(&self, tuner: f64) -> Option<&str> {
        self.lookup(tuner).map(|s| s.url.as_str())
    }

    pub fn stations(&self) -> &[StationRange] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Index pairs of ranges that share at least one tuner value.
    pub fn overlaps(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, a) in self.stations.iter().enumerate() {
            for (j, b) in self.stations.iter().enumerate().skip(i + 1) {
                if a.overlaps(b) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    /// Parse a station file. Invalid entries are dropped with a warning.
    pub fn load(path: &Path) -> Result<Self, StationError> {
        let content = fs::read_to_string(path)?;
        let stations = match serde_json::from_str::<StationFile>(&content)? {
            StationFile::Wrapped { stations } => stations,
            StationFile::Bare(stations) => stations,
        };

        let stations: Vec<StationRange> = stations
            .into_iter()
            .filter(|station| match station.validate() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Skipping station in {}: {}", path.display(), e);
                    false
                }
            })
            .collect();

        let directory = StationDirectory { stations };
        for (a, b) in directory.overlaps() {
            tracing::warn!(
                "Stations {} and {} overlap, the first one wins ({} / {})",
                a, b, directory.stations[a].url, directory.stations[b].url
            );
        }
        Ok(directory)
    }

    /// Start-up policy: a missing or broken file means no stations, only static.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(directory) => {
                tracing::info!("Loaded {} stations from {}", directory.len(), path.display());
                directory
            }
            Err(StationError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Station file not found: {}", path.display());
                Self::empty()
            }
            Err(e) => {
                tracing::error!("Error loading station map {}: {}", path.display(), e);
                Self::empty()
            }
        }
    }

    /// Write to a sibling temporary file, then rename it over `path`.
    pub fn save(&self, path: &Path) -> Result<(), StationError> {
        let json = serde_json::to_string_pretty(&StationFileOut { stations: &self.stations })?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Handle to the live directory, shared between the control loop and the
/// station editor.
#[derive(Debug, Clone, Default)]
pub struct SharedStations {
    inner: Arc<RwLock<Arc<StationDirectory>>>,
}

impl SharedStations {
    pub fn new(directory: StationDirectory) -> Self {
        SharedStations { inner: Arc::new(RwLock::new(Arc::new(directory))) }
    }

    /// The directory as of now. Later replacements do not affect it.
    pub fn snapshot(&self) -> Arc<StationDirectory> {
        Arc::clone(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, directory: StationDirectory) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(directory);
    }
}

/// Edits the persisted station list. Every change is validated, written to
/// disk and only then published to the control loop.
#[derive(Debug)]
pub struct StationManager {
    path: PathBuf,
    shared: SharedStations,
    writer: Mutex<()>,
}

impl StationManager {
    pub fn new(path: PathBuf, shared: SharedStations) -> Self {
        StationManager { path, shared, writer: Mutex::new(()) }
    }

    pub fn list(&self) -> Vec<StationRange> {
        self.shared.snapshot().stations().to_vec()
    }

    pub fn add(&self, station: StationRange) -> Result<Arc<StationDirectory>, StationError> {
        self.mutate(|stations| {
            stations.push(station);
            Ok(())
        })
    }

    pub fn update(&self, index: usize, station: StationRange) -> Result<Arc<StationDirectory>, StationError> {
        self.mutate(|stations| {
            let len = stations.len();
            let slot = stations.get_mut(index).ok_or(StationError::IndexOutOfRange { index, len })?;
            *slot = station;
            Ok(())
        })
    }

    pub fn remove(&self, index: usize) -> Result<Arc<StationDirectory>, StationError> {
        self.mutate(|stations| {
            check_index(index, stations.len())?;
            stations.remove(index);
            Ok(())
        })
    }

    pub fn move_station(&self, from: usize, to: usize) -> Result<Arc<StationDirectory>, StationError> {
        self.mutate(|stations| {
            check_index(from, stations.len())?;
            check_index(to, stations.len())?;
            let station = stations.remove(from);
            stations.insert(to, station);
            Ok(())
        })
    }

    /// Re-read the station file, replacing whatever is live.
    pub fn reload(&self) -> Result<Arc<StationDirectory>, StationError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let directory = StationDirectory::load(&self.path)?;
        tracing::info!("Reloaded {} stations from {}", directory.len(), self.path.display());
        self.shared.replace(directory);
        Ok(self.shared.snapshot())
    }

    fn mutate<F>(&self, change: F) -> Result<Arc<StationDirectory>, StationError>
    where
        F: FnOnce(&mut Vec<StationRange>) -> Result<(), StationError>,
    {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stations = self.shared.snapshot().stations().to_vec();
        change(&mut stations)?;

        let directory = StationDirectory::new(stations)?;
        directory.save(&self.path)?;
        self.shared.replace(directory);
        Ok(self.shared.snapshot())
    }
}

fn check_index(index: usize, len: usize) -> Result<(), StationError> {
    if index >= len {
        return Err(StationError::IndexOutOfRange { index, len });
    }
    Ok(())
}
