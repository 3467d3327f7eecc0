//! Shared fixtures for the integration tests.
//!
//! [`FakeStarter`] stands in for `starter.exe`: it parses the single
//! `"<command>,<param1>,<param2>"` argument, resolves both params against the
//! working directory like the real tool and writes plausible output files.
//! A fake archive is a text file listing the file names it contains.

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use gravipack::models::{LogicalFolder, ProjectPaths};
use gravipack::services::gateway::{ProcessOutcome, ToolInvocation, ToolRunner, ToolTimeouts};
use gravipack::services::{PipelineContext, ToolGateway, layout};
use std::fs;
use std::io;
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Default)]
pub struct FakeStarter {
    calls: Mutex<Vec<ToolInvocation>>,
    fail_patterns: Mutex<Vec<String>>,
}

impl FakeStarter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit with code 1 (writing nothing) for every argument containing `pattern`.
    pub fn fail_when(self, pattern: &str) -> Self {
        self.fail_patterns.lock().unwrap().push(pattern.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn arguments(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| call.args.join(" "))
            .collect()
    }

    fn execute(&self, invocation: &ToolInvocation) -> io::Result<i32> {
        let argument = invocation.args.first().cloned().unwrap_or_default();
        if self
            .fail_patterns
            .lock()
            .unwrap()
            .iter()
            .any(|pattern| argument.contains(pattern.as_str()))
        {
            return Ok(1);
        }

        let parts: Vec<&str> = argument.split(',').collect();
        let [command, first, second] = parts[..] else {
            return Ok(2);
        };
        let first = invocation.working_dir.join(first);
        let second = invocation.working_dir.join(second);

        match command {
            "unflat" => {
                let listing = fs::read_to_string(&first)?;
                fs::create_dir_all(&second)?;
                for name in listing.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    fs::write(second.join(name), format!("unpacked:{}", name))?;
                }
            }
            "atf2dds" | "dds2atf" | "wav2aaf" => {
                if !first.is_file() {
                    return Ok(3);
                }
                let source = fs::read_to_string(&first)?;
                fs::write(&second, format!("{}:{}", command, source))?;
            }
            "mkflat" => {
                let flatlist = fs::read_to_string(&second)?;
                fs::write(&first, flatlist)?;
            }
            _ => return Ok(4),
        }
        Ok(0)
    }
}

impl ToolRunner for FakeStarter {
    async fn run(&self, invocation: &ToolInvocation) -> io::Result<ProcessOutcome> {
        self.calls.lock().unwrap().push(invocation.clone());
        let exit_code = self.execute(invocation)?;
        Ok(ProcessOutcome {
            exit_code,
            output: String::new(),
        })
    }
}

/// A game install and a mod project inside one temp directory.
pub struct Workspace {
    _temp: TempDir,
    pub root: Utf8PathBuf,
    pub paths: ProjectPaths,
}

impl Workspace {
    /// Game root with `starter.exe`; the project is not initialized.
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let game = root.join("game");
        fs::create_dir_all(&game).unwrap();
        fs::write(game.join("starter.exe"), b"").unwrap();
        let paths = ProjectPaths::new(game, root.join("mod"));
        Self {
            _temp: temp,
            root,
            paths,
        }
    }

    /// Game root plus an initialized project skeleton.
    pub fn initialized() -> Self {
        let workspace = Self::new();
        layout::initialize(&workspace.paths).unwrap();
        workspace
    }

    /// Place a fake archive in `data/k43t/<location>/packed_data/`.
    pub fn add_archive(&self, location: &str, name: &str, files: &[&str]) -> Utf8PathBuf {
        let dir = self
            .paths
            .game_data()
            .join(location)
            .join("packed_data");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, files.join("\n")).unwrap();
        path
    }

    /// Write a file into a project folder.
    pub fn put(&self, folder: LogicalFolder, name: &str, content: &str) -> Utf8PathBuf {
        let dir = self.paths.folder(folder);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn context(&self, starter: FakeStarter) -> PipelineContext<FakeStarter> {
        let gateway = ToolGateway::with_runner(starter, ToolTimeouts::default());
        PipelineContext::new(self.paths.clone(), gateway)
    }

    /// Entries left in the game scratch area.
    pub fn modwork_entries(&self) -> Vec<String> {
        entries(&self.paths.game_modwork())
    }
}

/// Sorted names directly inside `dir`, empty when it does not exist.
pub fn entries(dir: &Utf8Path) -> Vec<String> {
    let Ok(read) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = read
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
