#![allow(dead_code)] // Not every test binary needs every helper

use clipsqueeze::engine::{EncodeRequest, PipelineOptions, Resolution};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub fn args_of(cmd: &Command) -> Vec<String> {
    cmd.get_args()
        .map(|arg| arg.to_string_lossy().to_string())
        .collect()
}

/// Scratch layout for one export: source, output, pass-log and temp folders.
pub struct Workspace {
    pub root: TempDir,
    pub source: PathBuf,
    pub out_dir: PathBuf,
    pub passlog_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let src_dir = root.path().join("src");
        let out_dir = root.path().join("out");
        let passlog_dir = root.path().join("passlogs");
        let temp_dir = root.path().join("tmp");
        for dir in [&src_dir, &out_dir, &passlog_dir, &temp_dir] {
            fs::create_dir_all(dir).unwrap();
        }
        let source = src_dir.join("clip.mp4");
        fs::write(&source, b"source").unwrap();
        Self {
            root,
            source,
            out_dir,
            passlog_dir,
            temp_dir,
        }
    }

    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            passlog_dir: self.passlog_dir.clone(),
            temp_dir: self.temp_dir.clone(),
            ..PipelineOptions::default()
        }
    }

    pub fn request(&self, size_mib: f64, resolution: Resolution) -> EncodeRequest {
        EncodeRequest::new(self.source.clone(), size_mib, resolution).with_output_dir(&self.out_dir)
    }

    pub fn expected_output(&self) -> PathBuf {
        self.out_dir.join("clip - (Processed).mp4")
    }
}

/// Sorted file names in `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
