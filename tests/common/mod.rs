#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use relsplit::{Schema, TableSpec};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Two tables where `parent` identifiers are embedded in `child` rows.
pub fn parent_child_schema() -> Schema {
    Schema::new(vec![
        TableSpec::new("parent")
            .column("p", "TEXT")
            .referenced_by(["child"]),
        TableSpec::new("child").column("c", "TEXT").references(["parent"]),
    ])
    .expect("valid parent/child schema")
}

/// Three-level chain: company -> contract -> payment.
pub fn contract_chain_schema() -> Schema {
    Schema::new(vec![
        TableSpec::new("company")
            .column("company_name", "TEXT")
            .referenced_by(["contract"]),
        TableSpec::new("contract")
            .column("contract_no", "TEXT")
            .column("amount", "NUMERIC")
            .references(["company"])
            .referenced_by(["payment"]),
        TableSpec::new("payment")
            .column("paid_on", "DATE")
            .column("paid_amount", "NUMERIC")
            .references(["contract"]),
    ])
    .expect("valid contract chain schema")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.temp_dir.path().join(name)).expect("read workspace file")
    }
}
