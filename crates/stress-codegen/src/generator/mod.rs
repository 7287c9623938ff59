//! Launcher generation.
//!
//! Both dialects honour the same contract: the derived variables are rebuilt
//! from the shared environment, every variable is exported, the test runs in
//! a scratch directory, and the launcher exits with the test's own status.

mod posix;
mod windows;

pub use posix::{posix_test_command_line, ExecutionFileGeneratorPosix};
pub use windows::{
    windows_test_command_line, BatchState, ExecutionFileGeneratorWindows, Transition,
};

use anyhow::Result;
use std::path::PathBuf;

use crate::load_test::LoadTestInfo;
use crate::script::write_artifact;
use crate::source_file::SourceFileInfo;

/// Files written by one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifacts {
    pub launcher: PathBuf,
    pub runner: PathBuf,
}

pub trait SourceFileGenerator {
    /// File name of the launcher inside the source directory.
    fn script_name(&self) -> &'static str;

    /// File name of the companion runner inside the source directory.
    fn runner_name(&self) -> &'static str;

    /// Rebuilds the derived variables in `info`'s environment and returns the
    /// launcher text.
    fn render_launcher(&self, info: &LoadTestInfo) -> String;

    fn render_runner(&self) -> Result<String>;

    /// Writes the launcher and runner and registers both for binplacing.
    /// Nothing is registered unless both files were written.
    fn generate_source_file(&self, info: &mut LoadTestInfo) -> Result<GeneratedArtifacts> {
        let launcher_text = self.render_launcher(info);
        let runner_text = self.render_runner()?;

        let launcher = info.source_directory.join(self.script_name());
        write_artifact(&launcher, launcher_text.as_bytes())?;
        tracing::debug!(path = %launcher.display(), "wrote launcher");
        let runner = info.source_directory.join(self.runner_name());
        write_artifact(&runner, runner_text.as_bytes())?;
        tracing::debug!(path = %runner.display(), "wrote companion runner");

        info.source_files
            .push(SourceFileInfo::binplace(self.script_name()));
        info.source_files
            .push(SourceFileInfo::binplace(self.runner_name()));
        tracing::info!(
            test = %info.test_name,
            launcher = self.script_name(),
            dir = %info.source_directory.display(),
            "generated execution files"
        );
        Ok(GeneratedArtifacts { launcher, runner })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Posix,
    Windows,
}

impl Platform {
    /// Platform this binary was built for.
    pub fn host() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Posix => "posix",
            Platform::Windows => "windows",
        }
    }

    pub fn generator(&self) -> Box<dyn SourceFileGenerator> {
        match self {
            Platform::Posix => Box::new(ExecutionFileGeneratorPosix),
            Platform::Windows => Box::new(ExecutionFileGeneratorWindows),
        }
    }
}

/// Generates the execution files of `info` for `platform`.
pub fn generate_execution_files(
    info: &mut LoadTestInfo,
    platform: Platform,
) -> Result<GeneratedArtifacts> {
    platform.generator().generate_source_file(info)
}
