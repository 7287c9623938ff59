//! `stress.bat` generation.
//!
//! Batch files have no structured control flow, so the launcher is described
//! as a small state machine ([`BatchState`]) and then lowered to labels and
//! `goto`s. Blocks are laid out in [`BatchState::LAYOUT`] order; a block falls
//! through to the next one in the layout and gets an explicit `goto` only when
//! its successor is somewhere else.

use anyhow::Result;

use super::SourceFileGenerator;
use crate::environment::{recompute_derived_variables, DUMPLING_PROPERTIES, STRESS_TESTID};
use crate::load_test::{LoadTestInfo, ScriptLayout};
use crate::resources::{normalized_template, SETUPDUMPLING_CMD};
use crate::script::{LineEnding, ScriptWriter};

const STRESS_SCRIPT_NAME: &str = "stress.bat";
const EXIT_CODE_VAR: &str = "_EXITCODE";
const SUCCESS_EXIT_CODE: i32 = 0;
const DUMPLING_SCRIPT: &str = r"%USERPROFILE%\.dumpling\dumpling.py";
const DUMP_PATH_FILE: &str = "dumpPath.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchState {
    Start,
    EnvSetup,
    StageDir,
    Execute,
    ReportPass,
    ErrorDiagnostics,
    RemoveTmpDir,
    End,
}

/// Where control goes after a state's block has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next(BatchState),
    /// Branch on the captured exit code.
    OnExitCode {
        success: BatchState,
        failure: BatchState,
    },
    Exit,
}

impl BatchState {
    /// Emission order of the blocks in the script.
    pub const LAYOUT: [BatchState; 8] = [
        BatchState::Start,
        BatchState::EnvSetup,
        BatchState::StageDir,
        BatchState::Execute,
        BatchState::ErrorDiagnostics,
        BatchState::ReportPass,
        BatchState::RemoveTmpDir,
        BatchState::End,
    ];

    pub fn label(&self) -> Option<&'static str> {
        match self {
            BatchState::Start => None,
            BatchState::EnvSetup => Some("ENV_SETUP"),
            BatchState::StageDir => Some("STAGE_DIR"),
            BatchState::Execute => Some("EXECUTE"),
            BatchState::ReportPass => Some("REPORT_PASS"),
            BatchState::ErrorDiagnostics => Some("ERROR_DIAGNOSTICS"),
            BatchState::RemoveTmpDir => Some("REMOVETMPDIR"),
            BatchState::End => Some("END"),
        }
    }

    pub fn transition(&self) -> Transition {
        match self {
            BatchState::Start => Transition::Next(BatchState::EnvSetup),
            BatchState::EnvSetup => Transition::Next(BatchState::StageDir),
            BatchState::StageDir => Transition::Next(BatchState::Execute),
            BatchState::Execute => Transition::OnExitCode {
                success: BatchState::ReportPass,
                failure: BatchState::ErrorDiagnostics,
            },
            BatchState::ReportPass | BatchState::ErrorDiagnostics => {
                Transition::Next(BatchState::RemoveTmpDir)
            }
            BatchState::RemoveTmpDir => Transition::Next(BatchState::End),
            BatchState::End => Transition::Exit,
        }
    }

    /// States visited by a run whose test exits with `exit_code`.
    pub fn path_for(exit_code: i32) -> Vec<BatchState> {
        let mut path = vec![BatchState::Start];
        let mut state = BatchState::Start;
        loop {
            state = match state.transition() {
                Transition::Next(next) => next,
                Transition::OnExitCode { success, failure } => {
                    if exit_code == SUCCESS_EXIT_CODE {
                        success
                    } else {
                        failure
                    }
                }
                Transition::Exit => return path,
            };
            path.push(state);
        }
    }

    fn layout_successor(&self) -> Option<BatchState> {
        let idx = Self::LAYOUT.iter().position(|s| s == self)?;
        Self::LAYOUT.get(idx + 1).copied()
    }
}

fn goto(state: BatchState) -> String {
    format!("goto :{}", state.label().unwrap_or_default())
}

/// `[host ]<test>.<ext>`; the host is used exactly as configured.
pub fn windows_test_command_line(info: &LoadTestInfo) -> String {
    let binary = info.suite_config.layout.test_binary(&info.test_name);
    match info.suite_config.host() {
        Some(host) => format!("{} {}", host, binary),
        None => binary,
    }
}

fn windows_path(path: &str) -> String {
    path.replace('/', "\\")
}

/// Emits `stress.bat` plus the `setupdumpling.cmd` it calls to install the
/// dump uploader.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionFileGeneratorWindows;

impl ExecutionFileGeneratorWindows {
    fn emit_block(&self, state: BatchState, info: &LoadTestInfo, script: &mut ScriptWriter) {
        let layout = &info.suite_config.layout;
        if let Some(label) = state.label() {
            script.line(format!(":{}", label));
        }
        match state {
            BatchState::Start => {
                script.line("@echo off");
                script.line(format!("REM stress script for {}", info.test_name));
                script.blank();
                script.blank();
                script.line(format!("call {}", SETUPDUMPLING_CMD));
            }
            BatchState::EnvSetup => {
                script.line("REM environment section");
                let mut env = info.environment_variables.borrow_mut();
                recompute_derived_variables(&mut env, &info.test_name);
                for (name, value) in env.iter() {
                    script.line(format!("set {}={}", name, value));
                }
                script.blank();
            }
            BatchState::StageDir => {
                script.line("REM Build the run directory");
                script.line(format!("mkdir {}", layout.run_directory));
                script.line(format!("pushd {}", layout.run_directory));
                script.line(format!(
                    r"xcopy ..\{}\* . /ey",
                    windows_path(&layout.build_output)
                ));
                script.line(format!(r"xcopy %{}%\* . /ey", layout.payload_variable));
                script.blank();
            }
            BatchState::Execute => {
                let command = windows_test_command_line(info);
                script.line("REM test execution");
                script.line(format!("echo calling [{}]", command));
                script.line(&command);
                script.line(format!("set {}=%ERRORLEVEL%", EXIT_CODE_VAR));
                script.line(format!("echo test exited with ExitCode: %{}%", EXIT_CODE_VAR));
            }
            BatchState::ErrorDiagnostics => {
                script.line("REM error processing");
                for line in upload_dump_lines(layout) {
                    script.line(line);
                }
            }
            BatchState::ReportPass => {
                script.line("echo Test Passed. Report the pass.");
            }
            BatchState::RemoveTmpDir => {
                script.line("popd");
                script.line(format!("rmdir {} /S /Q", layout.run_directory));
            }
            BatchState::End => {
                script.line(format!("exit /b %{}%", EXIT_CODE_VAR));
            }
        }
        self.emit_transition(state, script);
    }

    fn emit_transition(&self, state: BatchState, script: &mut ScriptWriter) {
        let fallthrough = state.layout_successor();
        match state.transition() {
            Transition::Next(next) => {
                if fallthrough != Some(next) {
                    script.line(goto(next));
                }
            }
            Transition::OnExitCode { success, failure } => {
                script.line(format!(
                    "if %{}% EQU {} {}",
                    EXIT_CODE_VAR,
                    SUCCESS_EXIT_CODE,
                    goto(success)
                ));
                if fallthrough != Some(failure) {
                    script.line(goto(failure));
                }
            }
            Transition::Exit => return,
        }
        script.blank();
    }
}

/// Finds the newest dump and hands it to dumpling. Failures here are ignored;
/// `_EXITCODE` is never touched.
fn upload_dump_lines(layout: &ScriptLayout) -> Vec<String> {
    let upload = format!(
        "%{py}% {dumpling} upload --dumppath %_corefile% --noprompt --triage full --displayname %{id}% --incpaths \"%cd%\" --properties %{props}%",
        py = layout.python_variable,
        dumpling = DUMPLING_SCRIPT,
        id = STRESS_TESTID,
        props = DUMPLING_PROPERTIES,
    );
    vec![
        format!(
            r#"powershell -Command "(Get-ChildItem {}\*.dmp | Sort-Object LastWriteTime | Select-Object -Last 1).FullName" > {}"#,
            layout.dump_directory, DUMP_PATH_FILE
        ),
        format!(
            "for /F \"tokens=*\" %%i IN ('type {}') do set _corefile=%%i",
            DUMP_PATH_FILE
        ),
        format!("echo 'executing {}'", upload),
        upload,
    ]
}

impl SourceFileGenerator for ExecutionFileGeneratorWindows {
    fn script_name(&self) -> &'static str {
        STRESS_SCRIPT_NAME
    }

    fn runner_name(&self) -> &'static str {
        SETUPDUMPLING_CMD
    }

    fn render_launcher(&self, info: &LoadTestInfo) -> String {
        let mut script = ScriptWriter::new(LineEnding::CrLf);
        for state in BatchState::LAYOUT {
            self.emit_block(state, info, &mut script);
        }
        script.finish()
    }

    fn render_runner(&self) -> Result<String> {
        normalized_template(SETUPDUMPLING_CMD, LineEnding::CrLf)
    }
}
