use anyhow::Result;

use super::SourceFileGenerator;
use crate::environment::recompute_derived_variables;
use crate::load_test::LoadTestInfo;
use crate::resources::{normalized_template, RUNSTRESS_SH};
use crate::script::{LineEnding, ScriptWriter};

const STRESS_SCRIPT_NAME: &str = "stress.sh";

/// Emits `stress.sh` plus the `runstress.sh` wrapper it runs the test under.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionFileGeneratorPosix;

/// `./runstress.sh [host] <test>.<ext>`.
///
/// A host that is neither absolute nor already `./`-relative gets a `./`
/// prefix so the shell takes it from the run directory instead of `PATH`.
pub fn posix_test_command_line(info: &LoadTestInfo) -> String {
    let mut command = info.suite_config.layout.test_binary(&info.test_name);
    if let Some(host) = info.suite_config.host() {
        command = format!("{} {}", host, command);
        if !host.starts_with('/') && !host.starts_with("./") {
            command = format!("./{}", command);
        }
    }
    format!("./{} {}", RUNSTRESS_SH, command)
}

impl SourceFileGenerator for ExecutionFileGeneratorPosix {
    fn script_name(&self) -> &'static str {
        STRESS_SCRIPT_NAME
    }

    fn runner_name(&self) -> &'static str {
        RUNSTRESS_SH
    }

    fn render_launcher(&self, info: &LoadTestInfo) -> String {
        let layout = &info.suite_config.layout;
        let mut script = ScriptWriter::new(LineEnding::Lf);

        script.line("#!/bin/sh");
        script.blank();
        script.blank();
        script.line(format!("# stress script for {}", info.test_name));
        script.blank();
        script.blank();

        script.line("# environment section");
        {
            let mut env = info.environment_variables.borrow_mut();
            recompute_derived_variables(&mut env, &info.test_name);
            for (name, value) in env.iter() {
                script.line(format!("export {}={}", name, value));
            }
        }
        script.blank();
        script.blank();

        script.line(format!("mkdir {}", layout.run_directory));
        script.line(format!("cd {}", layout.run_directory));
        script.blank();
        script.line(format!("cp -f -v ../{}/* .", layout.build_output));
        script.line(format!("cp -f -v ${}/* .", layout.payload_variable));
        script.line(format!("cp ../{} .", RUNSTRESS_SH));
        script.line(format!("chmod +x {}", RUNSTRESS_SH));
        if let Some(host) = info.suite_config.host() {
            script.line(format!("chmod +x {}", host));
        }

        let command = posix_test_command_line(info);
        script.line("#test execution");
        script.line(format!("echo executing [{}]", command));
        script.line(&command);
        // Nothing may run between the test and this line or $? is lost.
        script.line("export _EXITCODE=$?");
        script.line("cd ..");
        script.line("exit $_EXITCODE");

        script.finish()
    }

    fn render_runner(&self) -> Result<String> {
        normalized_template(RUNSTRESS_SH, LineEnding::Lf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentVariables;
    use crate::load_test::LoadSuiteConfig;

    fn info(test_name: &str, host: Option<&str>) -> LoadTestInfo {
        let config = LoadSuiteConfig {
            host: host.map(str::to_string),
            ..Default::default()
        };
        LoadTestInfo::new(
            test_name,
            "/tmp/stress_posix",
            EnvironmentVariables::new().shared(),
            config,
        )
    }

    #[test]
    fn bare_host_gets_relative_prefix() {
        assert_eq!(
            posix_test_command_line(&info("TestName", Some("myhost"))),
            "./runstress.sh ./myhost TestName.dll"
        );
    }

    #[test]
    fn absolute_and_dot_relative_hosts_are_left_alone() {
        assert_eq!(
            posix_test_command_line(&info("TestName", Some("/abs/host"))),
            "./runstress.sh /abs/host TestName.dll"
        );
        assert_eq!(
            posix_test_command_line(&info("TestName", Some("./corerun"))),
            "./runstress.sh ./corerun TestName.dll"
        );
    }

    #[test]
    fn no_host_runs_the_test_binary_directly() {
        assert_eq!(
            posix_test_command_line(&info("TestName", None)),
            "./runstress.sh TestName.dll"
        );
        assert_eq!(
            posix_test_command_line(&info("TestName", Some(""))),
            "./runstress.sh TestName.dll"
        );
    }

    #[test]
    fn launcher_stages_run_directory_before_invocation() {
        let text = ExecutionFileGeneratorPosix.render_launcher(&info("Foo_1", Some("corerun")));
        assert!(!text.contains('\r'));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "#!/bin/sh");
        let pos = |needle: &str| {
            lines
                .iter()
                .position(|l| *l == needle)
                .unwrap_or_else(|| panic!("missing line: {}", needle))
        };
        let mkdir = pos("mkdir tmpRun");
        let cd = pos("cd tmpRun");
        let build = pos("cp -f -v ../bin/Debug/netcoreapp2.0/* .");
        let payload = pos("cp -f -v $HELIX_CORRELATION_PAYLOAD/* .");
        let runner = pos("cp ../runstress.sh .");
        let chmod_host = pos("chmod +x corerun");
        let run = pos("./runstress.sh ./corerun Foo_1.dll");
        assert!(mkdir < cd && cd < build && build < payload && payload < runner);
        assert!(runner < chmod_host && chmod_host < run);
        assert_eq!(&lines[run + 1..], ["export _EXITCODE=$?", "cd ..", "exit $_EXITCODE"]);
    }

    #[test]
    fn no_host_means_no_host_chmod() {
        let text = ExecutionFileGeneratorPosix.render_launcher(&info("Foo_1", None));
        let chmods: Vec<&str> = text.lines().filter(|l| l.starts_with("chmod")).collect();
        assert_eq!(chmods, vec!["chmod +x runstress.sh"]);
    }

    #[cfg(unix)]
    #[test]
    fn generated_launcher_propagates_the_test_exit_code() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::process::Command;

        let root = tempfile::tempdir().expect("temp dir");
        let source = root.path().join("Crashy_1");
        let build = source.join("bin/Debug/netcoreapp2.0");
        let payload = root.path().join("payload");
        fs::create_dir_all(&build).expect("build dir");
        fs::create_dir_all(&payload).expect("payload dir");
        fs::write(payload.join("payload.txt"), b"payload").expect("payload file");

        let host = build.join("fakehost");
        fs::write(
            &host,
            "#!/bin/sh\n[ \"$1\" = \"Crashy_1.dll\" ] || exit 99\n[ \"$STRESS_BUILDID\" = \"Crashy\" ] || exit 98\n[ -f payload.txt ] || exit 97\nexit 3\n",
        )
        .expect("host");
        fs::set_permissions(&host, fs::Permissions::from_mode(0o755)).expect("chmod");
        fs::write(build.join("Crashy_1.dll"), b"").expect("dll");

        let config = LoadSuiteConfig {
            host: Some("fakehost".to_string()),
            ..Default::default()
        };
        let mut info = LoadTestInfo::new(
            "Crashy_1",
            &source,
            EnvironmentVariables::new().shared(),
            config,
        );
        let artifacts = ExecutionFileGeneratorPosix
            .generate_source_file(&mut info)
            .expect("generate");

        let status = Command::new("sh")
            .arg(&artifacts.launcher)
            .current_dir(&source)
            .env("HELIX_CORRELATION_PAYLOAD", &payload)
            .status()
            .expect("run launcher");
        assert_eq!(status.code(), Some(3));
    }
}
