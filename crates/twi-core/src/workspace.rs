//! Output workspace and per-run scratch space.
//!
//! Named rasters are stored as `<root>/<name>.json`. Scratch artifacts live in
//! a temporary directory inside the workspace that is removed when the
//! [`ScratchSpace`] is dropped, whether the run succeeded or not.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;

use crate::error::{Result, TwiError};
use crate::raster::Raster;

const SCRATCH_PREFIX: &str = ".twi-scratch-";

/// Name and location of a persisted raster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputHandle {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open (creating if absent) a workspace directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.artifact_path(name).exists()
    }

    /// Write `raster` under `name`. With `overwrite == false`, an existing
    /// artifact of that name is an error.
    pub fn persist(&self, name: &str, raster: &Raster, overwrite: bool) -> Result<OutputHandle> {
        check_name(name)?;
        let path = self.artifact_path(name);
        if !overwrite && path.exists() {
            return Err(TwiError::OutputExists(path));
        }
        write_raster(&path, raster)?;
        Ok(OutputHandle {
            name: name.to_string(),
            path,
        })
    }

    /// Read back a persisted raster.
    pub fn load(&self, name: &str) -> Result<Raster> {
        check_name(name)?;
        read_raster(&self.artifact_path(name))
    }

    /// Fresh scratch space for one run.
    pub fn scratch(&self) -> Result<ScratchSpace> {
        let dir = tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir_in(&self.root)?;
        Ok(ScratchSpace { dir })
    }
}

/// Temporary storage for intermediate rasters; removed on drop.
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn put(&self, name: &str, raster: &Raster) -> Result<PathBuf> {
        check_name(name)?;
        let path = self.dir.path().join(format!("{name}.json"));
        write_raster(&path, raster)?;
        Ok(path)
    }

    pub fn get(&self, name: &str) -> Result<Raster> {
        check_name(name)?;
        read_raster(&self.dir.path().join(format!("{name}.json")))
    }

    /// Remove the scratch directory now, surfacing any I/O error.
    pub fn close(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(TwiError::InvalidInput(format!("invalid raster name {name:?}")));
    }
    Ok(())
}

fn write_raster(path: &Path, raster: &Raster) -> Result<()> {
    let json = serde_json::to_string(raster)?;
    fs::write(path, json)?;
    Ok(())
}

fn read_raster(path: &Path) -> Result<Raster> {
    let text = fs::read_to_string(path)?;
    let raster: Raster = serde_json::from_str(&text)?;
    raster.validate()?;
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridGeometry;

    fn sample() -> Raster {
        let mut r = Raster::new(GridGeometry::new(3, 2, 0.0, 0.0, 2.0, 2.0), 1.5);
        r.set(1, 2, f64::NAN);
        r
    }

    #[test]
    fn persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path().join("ws")).unwrap();
        let handle = ws.persist("p_TWI", &sample(), true).unwrap();
        assert_eq!(handle.path, ws.root().join("p_TWI.json"));
        assert!(ws.exists("p_TWI"));

        let back = ws.load("p_TWI").unwrap();
        assert_eq!(back.grid, sample().grid);
        assert_eq!(back.get(0, 0), 1.5);
        assert!(back.get(1, 2).is_nan());
    }

    #[test]
    fn overwrite_disabled_refuses_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        ws.persist("p_TWI", &sample(), false).unwrap();
        assert!(matches!(
            ws.persist("p_TWI", &sample(), false),
            Err(TwiError::OutputExists(_))
        ));
        assert!(ws.persist("p_TWI", &sample(), true).is_ok());
    }

    #[test]
    fn names_cannot_escape_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        assert!(ws.persist("../evil", &sample(), true).is_err());
        assert!(ws.persist("", &sample(), true).is_err());
    }

    #[test]
    fn scratch_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let scratch_path;
        {
            let scratch = ws.scratch().unwrap();
            scratch_path = scratch.path().to_path_buf();
            scratch.put("dem_roi", &sample()).unwrap();
            assert_eq!(scratch.get("dem_roi").unwrap().grid, sample().grid);
            assert!(scratch_path.exists());
        }
        assert!(!scratch_path.exists());
    }

    #[test]
    fn scratch_close_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let scratch = ws.scratch().unwrap();
        let path = scratch.path().to_path_buf();
        scratch.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn scratch_copy_is_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let grid = GridGeometry::new(64, 64, 0.0, 0.0, 1.0, 1.0);
        let data = (0..grid.len()).map(|i| 812.0 + (i as f64 * 0.754_877_666_246_692_7).fract() * 97.3).collect();
        let dem = Raster::from_vec(grid, data).unwrap();

        let scratch = ws.scratch().unwrap();
        scratch.put("dem_roi", &dem).unwrap();
        let back = scratch.get("dem_roi").unwrap();
        assert!(dem.data.iter().zip(&back.data).all(|(a, b)| a.to_bits() == b.to_bits()));
    }
}
