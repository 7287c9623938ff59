//! Builds self-contained stress-run bundles: hint-path dependency resolution
//! and per-platform launcher scripts for a compiled test assembly.

pub mod environment;
pub mod generator;
pub mod resolver;
pub mod resources;
pub mod script;
pub mod source_file;

pub use environment::{
    build_id_for, recompute_derived_variables, EnvironmentVariables, SharedEnvironment,
    DUMPLING_PROPERTIES, STRESS_BUILDID, STRESS_TESTID,
};
pub use generator::{
    generate_execution_files, ExecutionFileGeneratorPosix, ExecutionFileGeneratorWindows,
    GeneratedArtifacts, Platform, SourceFileGenerator,
};
pub use load_test::{LoadSuiteConfig, LoadTestInfo, ScriptLayout};
pub use resolver::{
    AssemblyLoader, DependencySet, FileAssemblyLoader, HintPathResolver, LoadedAssembly,
    ResolutionPolicy, ResolveError,
};
pub use source_file::{PublishRegistry, SourceFileAction, SourceFileInfo};
