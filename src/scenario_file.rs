//! The calibration file: every calibrated [Scenario], in list order, written
//! as a single [RON](https://github.com/ron-rs/ron) document.
//!
//! The whole file is rewritten every time a scenario is added, removed, or
//! moved while merging. Display colours are not stored; they are recomputed
//! from the list order when the file is loaded.

use crate::scenario::{Scenario, ScenarioList};

use serde::{Deserialize, Serialize};

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// The version written into new files.
pub const SCENARIO_FILE_VERSION: u32 = 1;

/// What actually goes on disk.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ScenarioFileContents {
    /// Format version, currently always [SCENARIO_FILE_VERSION].
    pub version: u32,
    /// Scenarios in list order.
    pub scenarios: Vec<Scenario>,
}

/// Returned if things go wrong while reading or writing the calibration file.
#[derive(Debug)]
pub enum ScenarioFileError {
    /// The file was written by a newer or unknown format version.
    UnsupportedVersion(u32),

    /// Returned when io fails when reading or writing files.
    IoError(std::io::Error),

    /// Returned when serialization fails.
    RonError(ron::Error),

    /// Returned when deserialization fails.
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for ScenarioFileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ScenarioFileError as SFE;
        let msg = match self {
            SFE::UnsupportedVersion(v) => Cow::from(format!("unsupported file version {}", v)),
            SFE::IoError(error) => Cow::from(format!("io error: {}", error)),
            SFE::RonError(error) => Cow::from(format!("ron error: {}", error)),
            SFE::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ScenarioFileError {}

impl From<std::io::Error> for ScenarioFileError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

/// Writes `scenarios` to the [Write]able object provided.
pub fn save(scenarios: &ScenarioList, file: &mut impl Write) -> Result<(), ScenarioFileError> {
    let contents = ScenarioFileContents {
        version: SCENARIO_FILE_VERSION,
        scenarios: scenarios.as_slice().to_vec(),
    };
    let text = ron::ser::to_string_pretty(&contents, ron::ser::PrettyConfig::default())
        .map_err(ScenarioFileError::RonError)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

/// Reads scenarios from the [Read]able object provided.
pub fn load(file: &mut impl Read) -> Result<ScenarioList, ScenarioFileError> {
    let mut raw_text = Vec::new();
    file.read_to_end(&mut raw_text)?;

    let contents = ron::de::from_bytes::<ScenarioFileContents>(&raw_text)
        .map_err(ScenarioFileError::RonSpannedError)?;

    if contents.version != SCENARIO_FILE_VERSION {
        return Err(ScenarioFileError::UnsupportedVersion(contents.version));
    }

    Ok(ScenarioList::from_scenarios(contents.scenarios))
}

/// The calibration file at a fixed path.
#[derive(Debug, Clone)]
pub struct ScenarioStore {
    path: PathBuf,
}

impl ScenarioStore {
    /// A store for the file at `path`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Where the file lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the last calibration, or `None` if there is no file yet.
    pub fn load_if_present(&self) -> Result<Option<ScenarioList>, ScenarioFileError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut handle = File::open(&self.path)?;
        load(&mut handle).map(Some)
    }

    /// Rewrites the file with the whole list.
    pub fn save(&self, scenarios: &ScenarioList) -> Result<(), ScenarioFileError> {
        let mut handle = File::create(&self.path)?;
        save(scenarios, &mut handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::UnitAddress;
    use crate::scenario::{DisplayColor, Point3, ReceiverPlacement, ScenarioTransform};
    use std::io::Cursor;

    fn sample_list() -> ScenarioList {
        let mut list = ScenarioList::new();
        list.push(Scenario::new(
            "hall",
            vec![
                ReceiverPlacement {
                    address: UnitAddress(101),
                    position: Point3::new(0.0, 0.0, 2500.0),
                },
                ReceiverPlacement {
                    address: UnitAddress(102),
                    position: Point3::new(4000.0, 0.0, 2500.0),
                },
            ],
            [1000.0, 1000.0, 1414.2],
        ));
        let second = list.push(Scenario::new("lab", vec![], [800.0, 600.0, 1000.0]));
        list.get_mut(second).unwrap().transform = ScenarioTransform {
            translation: Point3::new(5000.0, 0.0, 0.0),
            yaw: 0.25,
        };
        list
    }

    #[test]
    fn write_and_read_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScenarioStore::new(dir.path().join("Calibration.ron"));
        assert!(store.load_if_present().unwrap().is_none());

        let list = sample_list();
        store.save(&list).unwrap();
        let read = store.load_if_present().unwrap().unwrap();
        assert_eq!(list, read);
    }

    #[test]
    fn write_and_read_cursor() {
        let mut buf = Cursor::new(Vec::new());
        let list = sample_list();
        save(&list, &mut buf).unwrap();
        buf.set_position(0);
        let read = load(&mut buf).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read.as_slice()[0].display_color, DisplayColor::Red);
        assert_eq!(read.as_slice()[1].display_color, DisplayColor::Blue);
        assert_eq!(read.as_slice()[1].transform.yaw, 0.25);
    }

    #[test]
    fn save_rewrites_the_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScenarioStore::new(dir.path().join("Calibration.ron"));
        let mut list = sample_list();
        store.save(&list).unwrap();

        let first = list.as_slice()[0].id;
        list.remove(first);
        store.save(&list).unwrap();

        let read = store.load_if_present().unwrap().unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read.as_slice()[0].name, "lab");
    }

    #[test]
    fn rejects_unknown_version() {
        let text = "(version: 7, scenarios: [])";
        let res = load(&mut Cursor::new(text.as_bytes()));
        assert!(matches!(res, Err(ScenarioFileError::UnsupportedVersion(7))));
    }

    #[test]
    fn rejects_garbage() {
        let res = load(&mut Cursor::new(b"not ron at all".to_vec()));
        assert!(matches!(res, Err(ScenarioFileError::RonSpannedError(_))));
    }
}
